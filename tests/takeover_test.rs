use std::collections::BTreeSet;

use log::LevelFilter;
use rendezvous_rs::{
    rendezvous::types::RendezvousPhase,
    robot::CoordinationMode,
    takeover::TakeoverStrategy,
    types::basic::{MeetingPointId, PartitionId, RobotId},
};

mod common;

use crate::common::{
    graphs::path,
    logging::setup_logger,
    swarm::{Swarm, Track},
};

#[test]
fn missing_robot_is_taken_over_before_the_next_meeting() {
    setup_logger(LevelFilter::Info);

    // 1. Two robots at both ends of a path, meeting every 100 ticks. Robot 1 disappears long before the
    //    first meeting and comes back at tick 300.
    let graph = path(10);
    let mut swarm = Swarm::new(
        graph.clone(),
        &[0, 9],
        100,
        TakeoverStrategy::Immediate,
        CoordinationMode::Rendezvous,
    );
    swarm.crash(1, 50..300);
    let (a, b) = (RobotId::new(0), RobotId::new(1));

    // 2. Robot 0 classifies the first meeting as missing robot 1, and absorbs its territory on the spot.
    swarm.run_until(200).unwrap();
    let tracks = swarm.tracks();
    assert!(tracks.contains(&Track::Missing {
        tick: 100,
        robot: a,
        missing: [b].into_iter().collect(),
    }));
    let takeover_tick = tracks
        .iter()
        .find_map(|track| match track {
            Track::TakeOver { tick, robot, missing, .. } if *robot == a && *missing == b => {
                Some(*tick)
            }
            _ => None,
        })
        .unwrap();
    assert!(takeover_tick < 200);
    assert_eq!(swarm.robot(0).current_territory(), graph.vertex_set());
    assert_eq!(swarm.robot(0).owned_partitions().len(), 2);

    // 3. Once back, robot 1 learns that it owns nothing any more, and never attends another meeting.
    swarm.run_until(400).unwrap();
    assert!(swarm.robot(1).owned_partitions().is_empty());
    for robot in swarm.robots() {
        let owners: BTreeSet<RobotId> = robot
            .plan()
            .unwrap()
            .territories()
            .keys()
            .filter_map(|partition| robot.owner_of(*partition))
            .collect();
        assert_eq!(owners, [a].into_iter().collect());
    }
    assert!(!swarm.tracks().iter().any(|track| matches!(
        track,
        Track::StartTravel { tick, robot, .. } if *robot == b && *tick >= 300
    )));
    assert_eq!(
        swarm.robot(1).rendezvous().unwrap().phase(),
        RendezvousPhase::Patrolling
    );
}

#[test]
fn takeover_conserves_every_vertex() {
    setup_logger(LevelFilter::Info);

    // 1. Three robots on a path; robot 1 disappears for good early on.
    let graph = path(12);
    let mut swarm = Swarm::new(
        graph.clone(),
        &[0, 6, 11],
        40,
        TakeoverStrategy::Immediate,
        CoordinationMode::Rendezvous,
    );
    swarm.crash(1, 5..u64::MAX);
    swarm.run_until(600).unwrap();

    // 2. The survivors agree on who owns what, robot 1 owns nothing, and between them they still patrol
    //    every vertex.
    let survivors = [swarm.robot(0), swarm.robot(2)];
    let partitions: Vec<_> = survivors[0]
        .plan()
        .unwrap()
        .territories()
        .keys()
        .copied()
        .collect();
    for partition in &partitions {
        let owner = survivors[0].owner_of(*partition);
        assert_eq!(owner, survivors[1].owner_of(*partition));
        assert_ne!(owner, Some(RobotId::new(1)));
    }

    let mut union = survivors[0].current_territory();
    union.extend(survivors[1].current_territory());
    assert_eq!(union, graph.vertex_set());

    // 3. Only robot 1's territory was ever absorbed.
    let absorbed: Vec<_> = swarm
        .tracks()
        .into_iter()
        .filter_map(|track| match track {
            Track::TakeOver {
                missing,
                partitions,
                ..
            } if !partitions.is_empty() => Some(missing),
            _ => None,
        })
        .collect();
    assert!(!absorbed.is_empty());
    assert!(absorbed.iter().all(|missing| *missing == RobotId::new(1)));
}

#[test]
fn quasi_random_takeover_follows_its_coin() {
    setup_logger(LevelFilter::Info);

    let (a, b) = (RobotId::new(0), RobotId::new(1));
    for (probability, takes_over) in [(0.0, false), (1.0, true)] {
        // 1. Two robots meeting every 100 ticks; robot 1 disappears for good before the first meeting.
        let mut swarm = Swarm::new(
            path(10),
            &[0, 9],
            100,
            TakeoverStrategy::QuasiRandom { probability },
            CoordinationMode::Rendezvous,
        );
        swarm.crash(1, 50..u64::MAX);
        swarm.run_until(250).unwrap();

        // 2. Robot 0 notices the absence at every meeting it keeps attending.
        let tracks = swarm.tracks();
        let missing_at: Vec<u64> = tracks
            .iter()
            .filter_map(|track| match track {
                Track::Missing { tick, robot, missing } if *robot == a && missing.contains(&b) => {
                    Some(*tick)
                }
                _ => None,
            })
            .collect();
        let took_over = tracks.iter().any(|track| {
            matches!(track, Track::TakeOver { robot, missing, .. } if *robot == a && *missing == b)
        });
        assert_eq!(took_over, takes_over, "probability {}", probability);

        // 3. Without a takeover the meeting keeps expecting robot 1; with one, robot 0 stops meeting.
        if takes_over {
            assert_eq!(missing_at, vec![100]);
            assert_eq!(swarm.robot(0).owned_partitions().len(), 2);
        } else {
            assert_eq!(missing_at, vec![100, 200]);
            assert_eq!(swarm.robot(0).owned_partitions().len(), 1);
            assert_eq!(swarm.robot(0).owner_of(PartitionId::new(1)), Some(b));
        }
    }
}

#[test]
fn best_neighbor_count_winner_skips_meetings_it_would_hold_alone() {
    setup_logger(LevelFilter::Info);

    // 1. Three robots on a path; robot 1 disappears for good early on.
    let graph = path(12);
    let mut swarm = Swarm::new(
        graph.clone(),
        &[0, 6, 11],
        40,
        TakeoverStrategy::BestNeighborCount,
        CoordinationMode::Rendezvous,
    );
    swarm.crash(1, 5..u64::MAX);
    swarm.run_until(600).unwrap();

    // 2. Exactly one survivor absorbed robot 1's territory.
    let winners: BTreeSet<RobotId> = swarm
        .tracks()
        .into_iter()
        .filter_map(|track| match track {
            Track::TakeOver { robot, missing, .. } if missing == RobotId::new(1) => Some(robot),
            _ => None,
        })
        .collect();
    assert_eq!(winners.len(), 1);
    let winner = *winners.first().unwrap();
    assert_ne!(winner, RobotId::new(1));

    // 3. The winner stops attending every meeting point between two of its own territories, and only
    //    those.
    let robot = swarm.robot(winner.int());
    let plan = robot.plan().unwrap();
    let alone: BTreeSet<MeetingPointId> = plan
        .points()
        .values()
        .filter(|point| {
            point
                .territories
                .iter()
                .all(|partition| robot.owner_of(*partition) == Some(winner))
        })
        .map(|point| point.id)
        .collect();
    assert!(!alone.is_empty());
    assert_eq!(robot.rendezvous().unwrap().skipped(), &alone);

    let mut union = swarm.robot(0).current_territory();
    union.extend(swarm.robot(2).current_territory());
    assert_eq!(union, graph.vertex_set());
}
