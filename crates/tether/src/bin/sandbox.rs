//! # Sandbox
//!
//! Minimal end-to-end demo: a ground slab, a falling ball, a player
//! capsule walking on the slab, and a weapon ray fired at the ground.
//! Drives the worker with manual steps so the output is deterministic.

use tether::{Tether, TetherConfig};
use tether_shm::{BodyDesc, BodyRecord, RayParams, ShapeParam};

const GROUND: u32 = 1;
const BALL: u32 = 2;
const PLAYER: u32 = 3;

fn main() {
    let config = TetherConfig {
        free_run: false,
        ..TetherConfig::default()
    };
    let mut tether = match Tether::spawn(&config) {
        Ok(tether) => tether,
        Err(err) => {
            eprintln!("failed to start: {err}");
            std::process::exit(1);
        }
    };

    tether.proxy.create_body(
        GROUND,
        BodyDesc::fixed(
            ShapeParam::Cuboid {
                half_extents: [10.0, 0.5, 10.0],
            },
            [0.0, -0.5, 0.0],
        ),
    );
    tether.proxy.create_body(
        BALL,
        BodyDesc::dynamic(ShapeParam::Sphere { radius: 1.0 }, [0.0, 5.0, 0.0]),
    );
    tether.proxy.create_body(
        PLAYER,
        BodyDesc::player(
            ShapeParam::Capsule {
                half_height: 0.9,
                radius: 0.4,
            },
            [3.0, 1.4, 0.0],
        ),
    );

    println!("tick |   ball y | player x | grounded");
    println!("-----+----------+----------+---------");

    for tick in 0..120u32 {
        tether.proxy.move_player(PLAYER, [0.02, -0.05, 0.0]);
        if tick == 60 {
            tether.proxy.cast_weapon_ray(
                PLAYER,
                RayParams {
                    origin: [3.0, 2.0, 0.0],
                    dir: [0.0, -1.0, 0.0],
                    max_distance: 100.0,
                },
            );
        }

        if let Err(err) = tether.step(config.fixed_dt) {
            eprintln!("worker died: {err}");
            std::process::exit(1);
        }

        let mut ball_y = 0.0;
        let mut player_x = 0.0;
        let mut grounded = 0.0;
        tether.proxy.apply_snapshot(&mut |record: &BodyRecord| {
            match record.phys_id {
                BALL => ball_y = record.pos[1],
                PLAYER => {
                    player_x = record.pos[0];
                    grounded = record.grounded;
                }
                _ => {}
            }
        });

        tether.proxy.drain_collisions(|event| {
            if event.is_start() {
                println!(
                    "     collision: {} <-> {}",
                    event.a_phys_id, event.b_phys_id
                );
            }
        });
        if let Some(hit) = tether.proxy.poll_weapon_hit() {
            if hit.is_hit() {
                println!(
                    "     weapon ray from {} hit {} at {:.2}m",
                    hit.source_phys_id, hit.hit_phys_id, hit.distance
                );
            } else {
                println!("     weapon ray from {} missed", hit.source_phys_id);
            }
        }

        if tick % 20 == 0 {
            println!(
                "{tick:4} | {ball_y:8.3} | {player_x:8.3} | {grounded:8.1}"
            );
        }
    }

    if let Err(err) = tether.shutdown() {
        eprintln!("shutdown failed: {err}");
        std::process::exit(1);
    }
    println!("done");
}
