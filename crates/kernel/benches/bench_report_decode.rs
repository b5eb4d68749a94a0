use std::hint::black_box;
use std::time::Instant;

use glam::{Quat, Vec3};
use physlink_common::ObjectId;
use physlink_kernel::decode::decode;
use physlink_kernel::{BodyDesc, Manifold, Registry};
use physlink_protocol::{CollisionEntry, Report, Shape, WorldEntry};

fn make_registry(body_count: usize) -> (Registry, Vec<ObjectId>) {
    let mut registry = Registry::new();
    let ids = (0..body_count)
        .filter_map(|i| {
            registry
                .register(
                    BodyDesc::new(Shape::Sphere { radius: 0.5 }, 1.0)
                        .with_position(Vec3::new(i as f32, 10.0, 0.0)),
                )
                .ok()
        })
        .collect();
    registry.drain_commands();
    (registry, ids)
}

fn bench_world_report(body_count: usize, iterations: usize) {
    let (mut registry, ids) = make_registry(body_count);
    let entries: Vec<_> = ids
        .iter()
        .map(|&id| WorldEntry {
            id,
            position: Vec3::new(id.0 as f32, 9.0, 0.0),
            quaternion: Quat::from_rotation_y(0.1),
            linear_velocity: Vec3::NEG_Y,
            angular_velocity: Vec3::ZERO,
        })
        .collect();
    let report = Report::encode(&entries);

    let start = Instant::now();
    for _ in 0..iterations {
        let _ = black_box(decode(&mut registry, black_box(&report)));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  world report ({body_count} bodies, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn bench_collision_report(body_count: usize, iterations: usize) {
    let (mut registry, ids) = make_registry(body_count);
    // Chain of neighbouring contacts, alternating which side is reported first.
    let entries: Vec<_> = ids
        .windows(2)
        .enumerate()
        .map(|(i, pair)| {
            let (a, b) = if i % 2 == 0 { (pair[0], pair[1]) } else { (pair[1], pair[0]) };
            CollisionEntry { a, b, normal: Vec3::Y }
        })
        .collect();
    let touching = Report::encode(&entries);
    let apart = Report::encode::<CollisionEntry>(&[]);

    let start = Instant::now();
    for i in 0..iterations {
        // Alternate so every other tick re-enters every contact.
        let report = if i % 2 == 0 { &touching } else { &apart };
        if let Ok(manifold) = Manifold::build(black_box(report)) {
            let _ = black_box(manifold.apply(&mut registry));
        }
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  collision report ({body_count} bodies, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn main() {
    println!("=== Report Decode Benchmarks ===\n");

    println!("World report:");
    bench_world_report(100, 10000);
    bench_world_report(1000, 1000);
    bench_world_report(10000, 100);

    println!("\nCollision manifold (enter/exit every tick):");
    bench_collision_report(100, 10000);
    bench_collision_report(1000, 1000);
    bench_collision_report(10000, 100);

    println!("\n=== Done ===");
}
