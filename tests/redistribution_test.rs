use log::LevelFilter;
use rendezvous_rs::{
    redistribution::RedistributionPolicy,
    robot::CoordinationMode,
    takeover::TakeoverStrategy,
    types::basic::{PartitionId, RobotId, Tick},
};

mod common;

use crate::common::{
    graphs::{grid, path},
    logging::setup_logger,
    swarm::{Swarm, Track},
};

#[test]
fn periodic_random_redistribution_moves_robots_between_partitions() {
    setup_logger(LevelFilter::Info);

    let mut swarm = Swarm::new(
        grid(4, 3),
        &[0, 5, 11],
        20,
        TakeoverStrategy::Immediate,
        CoordinationMode::Redistribution(RedistributionPolicy::PeriodicRandom { interval: 25 }),
    );
    swarm.run_until(201).unwrap();

    let tracks = swarm.tracks();
    let switches: Vec<_> = tracks
        .iter()
        .filter_map(|track| match track {
            Track::Redistribute { tick, .. } => Some(*tick),
            _ => None,
        })
        .collect();
    // Every robot switches at ticks 25, 50, ..., 200.
    assert_eq!(switches.len(), 3 * 8);
    assert!(switches.iter().all(|tick| tick % 25 == 0));

    // No meetings are held under a redistribution policy.
    assert!(tracks
        .iter()
        .all(|track| matches!(track, Track::Redistribute { .. })));
    for robot in swarm.robots() {
        assert_eq!(robot.owned_partitions().len(), 1);
    }
}

#[test]
fn communication_driven_robots_leave_after_repeated_failed_exchanges() {
    setup_logger(LevelFilter::Info);

    // 1. Two robots at both ends of a path. The medium goes silent once discovery is over, so every
    //    exchange at a partition boundary fails.
    let mut swarm = Swarm::with_reachability(
        Box::new(|_: RobotId, _: RobotId, tick: Tick| tick.int() < 3),
        path(10),
        &[0, 9],
        20,
        TakeoverStrategy::Immediate,
        CoordinationMode::Redistribution(RedistributionPolicy::CommunicationDriven { step: 0.25 }),
    );
    swarm.run_until(3).unwrap();
    let starting: Vec<PartitionId> = (0..2)
        .map(|i| *swarm.robot(i).owned_partitions().first().unwrap())
        .collect();
    assert_ne!(starting[0], starting[1]);

    // 2. Each robot gives up on its partition and moves to the neighbouring one.
    swarm.run_until(300).unwrap();
    for (i, start) in starting.iter().enumerate() {
        let robot = RobotId::new(i as u32);
        let first_switch = swarm.tracks().into_iter().find_map(|track| match track {
            Track::Redistribute { robot: mover, to, .. } if mover == robot => Some(to),
            _ => None,
        });
        assert_eq!(first_switch, Some(starting[1 - i]), "{} never left {}", robot, start);
        assert_eq!(swarm.robot(i as u32).owned_partitions().len(), 1);
        assert!(swarm.robot(i as u32).debug_info().contains("redistribution"));
    }
}
