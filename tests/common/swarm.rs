use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet},
    ops::Range,
    rc::Rc,
};

use rendezvous_rs::{
    events::{
        ExchangeInfoAtMeetingEvent, MissingRobotsAtMeetingEvent, RedistributeEvent,
        StartMeetingTravelEvent, TakeOverEvent,
    },
    graph::{PatrolGraph, ShortestPaths},
    networking::medium::{BroadcastMedium, MediumHandle, Reachability},
    partition::RegionGrowingGenerator,
    patrol::LeastRecentlyVisited,
    robot::{Configuration, CoordinationMode, Robot, RobotError, RobotSpec},
    scheduler::FixedIntervalEstimator,
    takeover::TakeoverStrategy,
    types::basic::{MeetingPointId, PartitionId, RobotId, Tick, VertexId},
};

pub(crate) const SEED: u64 = 11;

/// What the robots of a [`Swarm`] reported through their event handlers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Track {
    Exchange {
        tick: u64,
        robot: RobotId,
        point: MeetingPointId,
    },
    Missing {
        tick: u64,
        robot: RobotId,
        missing: BTreeSet<RobotId>,
    },
    StartTravel {
        tick: u64,
        robot: RobotId,
        point: MeetingPointId,
    },
    TakeOver {
        tick: u64,
        robot: RobotId,
        missing: RobotId,
        partitions: BTreeSet<PartitionId>,
    },
    Redistribute {
        tick: u64,
        robot: RobotId,
        to: PartitionId,
    },
}

pub(crate) struct Member {
    pub(crate) robot: Robot<MediumHandle>,
    pub(crate) position: VertexId,
}

/// A simulated team: robots on a shared [`BroadcastMedium`] that move one edge per tick towards
/// whatever target they return, patrol least-recently-visited vertices, and can be crashed for a
/// window of ticks (a crashed robot is simply not ticked).
pub(crate) struct Swarm {
    medium: BroadcastMedium,
    paths: ShortestPaths,
    members: Vec<Member>,
    crashes: BTreeMap<RobotId, Range<u64>>,
    now: u64,
    tracks: Rc<RefCell<Vec<Track>>>,
}

impl Swarm {
    /// Robot `i` starts at `starts[i]`. Every robot meets its neighbours every `interval` ticks.
    pub(crate) fn new(
        graph: PatrolGraph,
        starts: &[u32],
        interval: u64,
        strategy: TakeoverStrategy,
        coordination: CoordinationMode,
    ) -> Swarm {
        Swarm::with_reachability(
            Box::new(|_, _, _| true),
            graph,
            starts,
            interval,
            strategy,
            coordination,
        )
    }

    /// Like [`Swarm::new`], on a medium that only delivers the broadcasts `reachable` accepts.
    pub(crate) fn with_reachability(
        reachable: Reachability,
        graph: PatrolGraph,
        starts: &[u32],
        interval: u64,
        strategy: TakeoverStrategy,
        coordination: CoordinationMode,
    ) -> Swarm {
        let medium = BroadcastMedium::with_reachability(reachable);
        let paths = ShortestPaths::new(&graph);
        let tracks = Rc::new(RefCell::new(Vec::new()));

        let members = starts
            .iter()
            .enumerate()
            .map(|(i, start)| {
                let me = RobotId::new(i as u32);
                let configuration = Configuration::builder()
                    .me(me)
                    .seed(SEED)
                    .discovery_ticks(2)
                    .gossip_period(5)
                    .takeover_strategy(strategy)
                    .log_events(true)
                    .coordination(coordination)
                    .build();

                let (exchange, missing, travel, take_over, redistribute) = (
                    tracks.clone(),
                    tracks.clone(),
                    tracks.clone(),
                    tracks.clone(),
                    tracks.clone(),
                );
                let mut robot = RobotSpec::builder()
                    .graph(graph.clone())
                    .estimator(paths.clone())
                    .generator(RegionGrowingGenerator::new(SEED))
                    .patrol(LeastRecentlyVisited::new())
                    .network(medium.join(me))
                    .configuration(configuration)
                    .interval_estimator(FixedIntervalEstimator(interval))
                    .on_exchange_info_at_meeting(move |event: &ExchangeInfoAtMeetingEvent| {
                        exchange.borrow_mut().push(Track::Exchange {
                            tick: event.tick.int(),
                            robot: event.robot,
                            point: event.meeting.point,
                        })
                    })
                    .on_missing_robots_at_meeting(move |event: &MissingRobotsAtMeetingEvent| {
                        missing.borrow_mut().push(Track::Missing {
                            tick: event.tick.int(),
                            robot: event.robot,
                            missing: event.missing.clone(),
                        })
                    })
                    .on_start_meeting_travel(move |event: &StartMeetingTravelEvent| {
                        travel.borrow_mut().push(Track::StartTravel {
                            tick: event.tick.int(),
                            robot: event.robot,
                            point: event.meeting.point,
                        })
                    })
                    .on_take_over(move |event: &TakeOverEvent| {
                        take_over.borrow_mut().push(Track::TakeOver {
                            tick: event.tick.int(),
                            robot: event.robot,
                            missing: event.missing,
                            partitions: event.partitions.clone(),
                        })
                    })
                    .on_redistribute(move |event: &RedistributeEvent| {
                        redistribute.borrow_mut().push(Track::Redistribute {
                            tick: event.tick.int(),
                            robot: event.robot,
                            to: event.to,
                        })
                    })
                    .build()
                    .build_robot();

                let position = VertexId::new(*start);
                robot.on_reach_vertex(position, Tick::init());
                Member { robot, position }
            })
            .collect();

        Swarm {
            medium,
            paths,
            members,
            crashes: BTreeMap::new(),
            now: 0,
            tracks,
        }
    }

    /// `robot` is not ticked during `window`.
    pub(crate) fn crash(&mut self, robot: u32, window: Range<u64>) {
        self.crashes.insert(RobotId::new(robot), window);
    }

    pub(crate) fn now(&self) -> u64 {
        self.now
    }

    /// Tick every robot that is not crashed, move it one edge, and deliver this tick's broadcasts.
    pub(crate) fn step(&mut self) -> Result<(), (RobotId, RobotError)> {
        let now = Tick::new(self.now);
        for member in &mut self.members {
            let me = member.robot.me();
            if self
                .crashes
                .get(&me)
                .is_some_and(|window| window.contains(&self.now))
            {
                continue;
            }

            let target = member
                .robot
                .tick(now, member.position)
                .map_err(|error| (me, error))?;
            if let Some(next) = self.paths.next_hop(member.position, target) {
                member.position = next;
                member.robot.on_reach_vertex(next, now);
            }
        }
        self.medium.advance();
        self.now += 1;
        Ok(())
    }

    /// Step until (excluding) tick `end`.
    pub(crate) fn run_until(&mut self, end: u64) -> Result<(), (RobotId, RobotError)> {
        while self.now < end {
            self.step()?;
        }
        Ok(())
    }

    pub(crate) fn robot(&self, robot: u32) -> &Robot<MediumHandle> {
        &self.members[robot as usize].robot
    }

    pub(crate) fn robots(&self) -> impl Iterator<Item = &Robot<MediumHandle>> {
        self.members.iter().map(|member| &member.robot)
    }

    pub(crate) fn tracks(&self) -> Vec<Track> {
        self.tracks.borrow().clone()
    }
}
