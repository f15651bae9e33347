use log::LevelFilter;
use rendezvous_rs::{
    rendezvous::types::RendezvousPhase, robot::CoordinationMode, takeover::TakeoverStrategy,
};

mod common;

use crate::common::{graphs::grid, logging::setup_logger, swarm::Swarm};

#[test]
fn a_lone_robot_only_patrols() {
    setup_logger(LevelFilter::Info);

    let graph = grid(4, 4);
    let mut swarm = Swarm::new(
        graph.clone(),
        &[5],
        10,
        TakeoverStrategy::Immediate,
        CoordinationMode::Rendezvous,
    );

    while swarm.now() < 500 {
        swarm.step().unwrap();
        if let Some(rendezvous) = swarm.robot(0).rendezvous() {
            assert_eq!(rendezvous.phase(), RendezvousPhase::Patrolling);
        }
    }

    let robot = swarm.robot(0);
    let plan = robot.plan().unwrap();
    assert_eq!(plan.points().len(), 1);
    assert!(plan.points().values().all(|point| point.schedule.is_never()));
    assert_eq!(robot.current_territory(), graph.vertex_set());
    assert!(swarm.tracks().is_empty());
}
