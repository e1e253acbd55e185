//! Turn round-trip latency benchmark

use criterion::{Criterion, criterion_group, criterion_main};
use quad::config::ChannelNames;
use quad::shm::message::{Mode, SimulatorMessage};
use quad_shared_memory::{RobotEndpoint, SimulatorEndpoint};
use std::hint::black_box;
use std::thread;

/// Benchmark one simulator → robot → simulator exchange
fn bench_turn_round_trip(c: &mut Criterion) {
    let names = ChannelNames::with_suffix(&format!("bench-{}", std::process::id()));
    let mut sim = SimulatorEndpoint::<SimulatorMessage>::create(&names).unwrap();
    sim.message_mut().unwrap().sim_to_robot.set_mode(Mode::Idle);

    let robot_names = names.clone();
    let robot = thread::spawn(move || {
        let mut robot = RobotEndpoint::<SimulatorMessage>::attach(&robot_names).unwrap();
        loop {
            robot.wait_for_simulator().unwrap();
            let exit = robot.message().unwrap().sim_to_robot.mode() == Some(Mode::Exit);
            robot.signal_robot_done().unwrap();
            if exit {
                break;
            }
        }
    });

    c.bench_function("turn_round_trip", |b| {
        b.iter(|| {
            sim.signal_simulator_done().unwrap();
            sim.wait_for_robot().unwrap();
            black_box(sim.message().unwrap().robot_to_sim.robot_type);
        });
    });

    sim.message_mut().unwrap().sim_to_robot.set_mode(Mode::Exit);
    sim.signal_simulator_done().unwrap();
    sim.wait_for_robot().unwrap();
    robot.join().unwrap();
    sim.destroy().unwrap();
}

criterion_group!(benches, bench_turn_round_trip);
criterion_main!(benches);
