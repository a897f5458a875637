// Benchmarks for the placement path: reserving a large structure (template
// parse, validation, marker placement) and driving its placement queue to
// completion at the default per-tick budget.
//
// Run with `cargo bench -p hamlet_sim`.

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use hamlet_sim::config::GameConfig;
use hamlet_sim::rotation::Rotation;
use hamlet_sim::sim::SimState;
use hamlet_sim::types::{BuildingId, VoxelCoord};
use hamlet_sim::world::VoxelWorld;

const SIDE: i32 = 16;
const HEIGHT: i32 = 8;

/// A hollow stone keep: walls, floor, and a log roof.
fn keep_json() -> String {
    let mut blocks = Vec::new();
    for y in 0..HEIGHT {
        for z in 0..SIDE {
            for x in 0..SIDE {
                let edge = x == 0 || z == 0 || x == SIDE - 1 || z == SIDE - 1;
                let block = match y {
                    0 => "minecraft:cobblestone",
                    y if y == HEIGHT - 1 => "minecraft:spruce_log",
                    _ if edge => "minecraft:stone_bricks",
                    _ => "minecraft:air",
                };
                blocks.push(format!(
                    r#"{{ "pos": [{x}, {y}, {z}], "block": "{block}" }}"#
                ));
            }
        }
    }
    format!(
        r#"{{ "size": [{SIDE}, {HEIGHT}, {SIDE}], "category": "house", "blocks": [{}] }}"#,
        blocks.join(",")
    )
}

fn sim() -> SimState {
    let config = GameConfig {
        creative_mode: true,
        ..GameConfig::default()
    };
    SimState::with_config(1, config)
}

fn reserved(json: &str) -> (SimState, VoxelWorld, BuildingId) {
    let mut sim = sim();
    sim.templates.register_json("hamlet:keep", json.to_owned());
    let mut world = VoxelWorld::new();
    let sid = sim.found_settlement("Bench", VoxelCoord::new(0, 64, 0), Some(64));
    let building = sim
        .reserve_building(&mut world, sid, "hamlet:keep", VoxelCoord::new(4, 64, 4), Rotation::Clockwise90)
        .expect("keep fits");
    (sim, world, building.id)
}

fn bench_reserve(c: &mut Criterion) {
    let json = keep_json();
    c.bench_function("reserve_keep", |b| {
        b.iter_batched(
            || {
                let mut sim = sim();
                sim.templates.register_json("hamlet:keep", json.clone());
                let sid = sim.found_settlement("Bench", VoxelCoord::new(0, 64, 0), Some(64));
                (sim, VoxelWorld::new(), sid)
            },
            |(mut sim, mut world, sid)| {
                black_box(sim.reserve_building(
                    &mut world,
                    sid,
                    "hamlet:keep",
                    VoxelCoord::new(4, 64, 4),
                    Rotation::Clockwise90,
                ))
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_place_to_completion(c: &mut Criterion) {
    let json = keep_json();
    c.bench_function("place_keep_to_completion", |b| {
        b.iter_batched(
            || {
                let (mut sim, mut world, id) = reserved(&json);
                sim.start_construction(&mut world, id).expect("creative start");
                (sim, world, id)
            },
            |(mut sim, mut world, id)| {
                while sim.scheduler.is_active(id) {
                    black_box(sim.run_placement(&mut world));
                }
                world
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_reserve, bench_place_to_completion);
criterion_main!(benches);
