/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build and drive a single robot.
//!
//! A [`Robot`] glues the protocol components together: it drains its inbox, merges the replicated
//! stores, feeds the [rendezvous](crate::rendezvous) state machine, acts on resolved meetings (including
//! [takeovers](crate::takeover)), gossips its stores, and tells the caller where to head next.
//!
//! The key components of this module are:
//! - The builder-pattern interface to construct a [specification of the robot](RobotSpec) with:
//!   1. `RobotSpec::builder` to construct a `RobotSpecBuilder`,
//!   2. The setters of the `RobotSpecBuilder`, and
//!   3. The `RobotSpecBuilder::build` method to construct a [RobotSpec],
//! - The function to [build](RobotSpec::build_robot) a [Robot] given its specification,
//! - The function to advance the robot by one [tick](Robot::tick).
//!
//! ## Discovery
//!
//! Territories and meeting points are computed locally, and identically, by every robot. The only thing
//! robots need to agree on beforehand is who takes part. Unless the set of robots is given up front
//! with `.known_robots(...)`, a robot spends its first
//! [`discovery_ticks`](Configuration::discovery_ticks) ticks broadcasting [`Hello`]s and collecting the
//! ids and start vertices of everyone it hears from.
//!
//! ## Driving a robot
//!
//! Here is an example that demonstrates how to build a robot and drive it using the builder pattern:
//!
//! ```ignore
//! let mut robot =
//!     RobotSpec::builder()
//!     .graph(graph)
//!     .estimator(estimator)
//!     .generator(RegionGrowingGenerator::new(seed))
//!     .patrol(LeastRecentlyVisited::new())
//!     .network(network)
//!     .configuration(configuration)
//!     .on_missing_robots_at_meeting(missing_handler)
//!     .build()
//!     .build_robot();
//!
//! loop {
//!     let target = robot.tick(now, position)?;
//!     // Move towards `target`, calling `robot.on_reach_vertex(...)` on arrival.
//! }
//! ```
//!
//! ### Required setters
//!
//! - `.graph(...)`
//! - `.estimator(...)`
//! - `.generator(...)`
//! - `.patrol(...)`
//! - `.network(...)`
//! - `.configuration(...)`
//!
//! ### Optional setters
//!
//! - `.interval_estimator(...)`
//! - `.known_robots(...)`
//! - `.on_exchange_info_at_meeting(...)`
//! - `.on_missing_robots_at_meeting(...)`
//! - `.on_unknown_robot_at_meeting(...)`
//! - `.on_start_meeting_travel(...)`
//! - `.on_reach_vertex(...)`
//! - `.on_take_over(...)`
//! - `.on_redistribute(...)`
//!
//! The robot's [configuration](Configuration) can also be defined using the builder pattern, for example:
//!
//! ```ignore
//! let configuration =
//!     Configuration::builder()
//!     .me(RobotId::new(0))
//!     .seed(42)
//!     .discovery_ticks(2)
//!     .gossip_period(5)
//!     .takeover_strategy(TakeoverStrategy::Immediate)
//!     .log_events(true)
//!     .build()
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::mpsc::{self, Receiver, Sender};

use typed_builder::TypedBuilder;

use crate::event_bus::*;
use crate::events::*;
use crate::graph::{PatrolGraph, TravelTimeEstimator};
use crate::networking::messages::{Hello, Message};
use crate::networking::network::Network;
use crate::networking::receiving::Inbox;
use crate::networking::sending::SenderHandle;
use crate::partition::{
    assignment_of, generate_territories, seed_ownership, territories_owned_by, ConfigurationError,
    OwnershipStore, PartitionGenerator,
};
use crate::patrol::PatrolAlgorithm;
use crate::redistribution::{met_at, RedistributionContext, RedistributionPolicy, Redistributor};
use crate::rendezvous::types::{MeetingOutcome, Resolution, StepContext};
use crate::rendezvous::{seed_meetings, MeetingStore, Rendezvous, RendezvousError};
use crate::scheduler::{DiameterIntervalEstimator, IntervalEstimator, MeetingPlan};
use crate::store::{LatestMeetingWins, LowestWriterWins, StoreError};
use crate::takeover::{
    absorb, on_missing_robot_at_meeting, reassign_attendees, TakeoverContext, TakeoverStrategy,
};
use crate::types::basic::{MeetingPointId, PartitionId, RobotId, Tick, VertexId};
use crate::types::meeting::MeetingRecord;
use crate::types::territory::Territory;

/// How a robot coordinates with its peers once its territories are known.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CoordinationMode {
    /// Scheduled meetings and takeovers.
    Rendezvous,

    /// One of the naive load-balancing baselines. The robot patrols one partition at a time and never
    /// writes to the replicated stores.
    Redistribution(RedistributionPolicy),
}

/// Stores the user-defined parameters required to run a robot, that is:
/// 1. The robot's id.
/// 2. The seed shared by every robot of the run, used by the randomized strategies.
/// 3. The number of ticks spent discovering peers before territories are computed.
/// 4. The gossip period: how often (in ticks) the replicated stores are re-broadcast even if nothing
///    changed.
/// 5. The [takeover strategy](crate::takeover).
/// 6. The "Log Events" flag, if set to "true" then logs should be printed.
/// 7. The coordination mode (rendezvous unless set otherwise).
///
/// ## Seed
///
/// Every robot of a run must be given the same seed. The partition generator and the quasi-random
/// takeover strategy rely on it to reach the same decisions on every robot without communicating.
///
/// ## Log Events
///
/// rendezvous-rs logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
/// printed onto a terminal or to a file, set up a [logging
/// implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
#[derive(Clone, Debug, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.me(...)`
    - `.seed(...)`
    - `.discovery_ticks(...)`
    - `.gossip_period(...)`
    - `.takeover_strategy(...)`
    - `.log_events(...)`

    Optional:
    - `.coordination(...)`
"))]
pub struct Configuration {
    #[builder(setter(doc = "Set the robot's id. Required."))]
    pub me: RobotId,
    #[builder(setter(doc = "Set the seed shared by every robot of the run. Required."))]
    pub seed: u64,
    #[builder(setter(doc = "Set the number of ticks spent discovering peers. Required."))]
    pub discovery_ticks: u64,
    #[builder(setter(doc = "Set the period (in ticks) of the unconditional store gossip. 0 disables it. Required."))]
    pub gossip_period: u64,
    #[builder(setter(doc = "Set the strategy that elects who absorbs a missing robot's territory. Required."))]
    pub takeover_strategy: TakeoverStrategy,
    #[builder(setter(doc = "Enable logging? Required."))]
    pub log_events: bool,
    #[builder(default = CoordinationMode::Rendezvous, setter(doc = "Set the coordination mode. Optional, defaults to rendezvous."))]
    pub coordination: CoordinationMode,
}

/// Stores all necessary parameters and trait implementations required to run the [Robot].
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [RobotSpec]. On the builder call the following methods to construct a valid [RobotSpec].

    Required:
    - `.graph(...)`
    - `.estimator(...)`
    - `.generator(...)`
    - `.patrol(...)`
    - `.network(...)`
    - `.configuration(...)`

    Optional:
    - `.interval_estimator(...)`
    - `.known_robots(...)`
    - `.on_exchange_info_at_meeting(...)`
    - `.on_missing_robots_at_meeting(...)`
    - `.on_unknown_robot_at_meeting(...)`
    - `.on_start_meeting_travel(...)`
    - `.on_reach_vertex(...)`
    - `.on_take_over(...)`
    - `.on_redistribute(...)`
"))]
pub struct RobotSpec<N: Network + 'static> {
    // Required parameters
    #[builder(setter(doc = "Set the graph of waypoints to patrol. Required."))]
    graph: PatrolGraph,
    #[builder(setter(transform = |estimator: impl TravelTimeEstimator + 'static| Box::new(estimator) as Box<dyn TravelTimeEstimator>,
    doc = "Set the travel-time estimator. The argument must implement the [TravelTimeEstimator](crate::graph::TravelTimeEstimator) trait. Required."))]
    estimator: Box<dyn TravelTimeEstimator>,
    #[builder(setter(transform = |generator: impl PartitionGenerator + 'static| Box::new(generator) as Box<dyn PartitionGenerator>,
    doc = "Set the partition generator. Every robot of a run must use an identical generator. Required."))]
    generator: Box<dyn PartitionGenerator>,
    #[builder(setter(transform = |patrol: impl PatrolAlgorithm + 'static| Box::new(patrol) as Box<dyn PatrolAlgorithm>,
    doc = "Set the patrol algorithm followed between meetings. Required."))]
    patrol: Box<dyn PatrolAlgorithm>,
    #[builder(setter(doc = "Set the implementation of broadcast networking. The argument must implement the [Network](crate::networking::network::Network) trait. Required."))]
    network: N,
    #[builder(setter(doc = "Set the [configuration](Configuration), which contains the necessary parameters to run a robot. Required."))]
    configuration: Configuration,
    // Optional parameters
    #[builder(default = Box::new(DiameterIntervalEstimator) as Box<dyn IntervalEstimator>, setter(transform = |estimator: impl IntervalEstimator + 'static| Box::new(estimator) as Box<dyn IntervalEstimator>,
    doc = "Set the estimator of the meeting interval. Optional, defaults to [DiameterIntervalEstimator](crate::scheduler::DiameterIntervalEstimator)."))]
    interval_estimator: Box<dyn IntervalEstimator>,
    #[builder(default, setter(strip_option,
    doc = "Set every participating robot and the vertex it starts at, skipping discovery. Optional."))]
    known_robots: Option<BTreeMap<RobotId, VertexId>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ExchangeInfoAtMeetingEvent) + 'static| Some(Box::new(handler) as HandlerPtr<ExchangeInfoAtMeetingEvent>),
    doc = "Register a handler closure to be invoked after a meeting was held with every expected robot. Optional."))]
    on_exchange_info_at_meeting: Option<HandlerPtr<ExchangeInfoAtMeetingEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&MissingRobotsAtMeetingEvent) + 'static| Some(Box::new(handler) as HandlerPtr<MissingRobotsAtMeetingEvent>),
    doc = "Register a handler closure to be invoked after a meeting ended with an expected robot missing. Optional."))]
    on_missing_robots_at_meeting: Option<HandlerPtr<MissingRobotsAtMeetingEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UnknownRobotAtMeetingEvent) + 'static| Some(Box::new(handler) as HandlerPtr<UnknownRobotAtMeetingEvent>),
    doc = "Register a handler closure to be invoked after a meeting was attended by unexpected robots. Optional."))]
    on_unknown_robot_at_meeting: Option<HandlerPtr<UnknownRobotAtMeetingEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartMeetingTravelEvent) + 'static| Some(Box::new(handler) as HandlerPtr<StartMeetingTravelEvent>),
    doc = "Register a handler closure to be invoked after the robot leaves patrolling for a meeting. Optional."))]
    on_start_meeting_travel: Option<HandlerPtr<StartMeetingTravelEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReachVertexEvent) + 'static| Some(Box::new(handler) as HandlerPtr<ReachVertexEvent>),
    doc = "Register a handler closure to be invoked after the robot reaches a vertex. Optional."))]
    on_reach_vertex: Option<HandlerPtr<ReachVertexEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&TakeOverEvent) + 'static| Some(Box::new(handler) as HandlerPtr<TakeOverEvent>),
    doc = "Register a handler closure to be invoked after the robot absorbed a missing robot's territories. Optional."))]
    on_take_over: Option<HandlerPtr<TakeOverEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RedistributeEvent) + 'static| Some(Box::new(handler) as HandlerPtr<RedistributeEvent>),
    doc = "Register a handler closure to be invoked after the robot switched partitions under a redistribution policy. Optional."))]
    on_redistribute: Option<HandlerPtr<RedistributeEvent>>,
}

impl<N: Network + 'static> RobotSpec<N> {
    /// Wire up the event bus and return a [Robot] ready to be [ticked](Robot::tick).
    pub fn build_robot(self) -> Robot<N> {
        let event_handlers = EventHandlers::new(
            self.configuration.log_events,
            UserHandlers {
                exchange_info_at_meeting: self.on_exchange_info_at_meeting,
                missing_robots_at_meeting: self.on_missing_robots_at_meeting,
                unknown_robot_at_meeting: self.on_unknown_robot_at_meeting,
                start_meeting_travel: self.on_start_meeting_travel,
                reach_vertex: self.on_reach_vertex,
                take_over: self.on_take_over,
                redistribute: self.on_redistribute,
            },
        );

        let (event_publisher, event_subscriber) = if !event_handlers.is_empty() {
            Some(mpsc::channel()).unzip()
        } else {
            (None, None)
        };

        let phase = match self.known_robots {
            Some(known) => Phase::Starting(known),
            None => Phase::Discovering {
                starts: BTreeMap::new(),
                until: None,
            },
        };

        Robot {
            configuration: self.configuration,
            collaborators: Collaborators {
                graph: self.graph,
                estimator: self.estimator,
                generator: self.generator,
                interval_estimator: self.interval_estimator,
                patrol: self.patrol,
                sender: SenderHandle::new(self.network),
                event_publisher,
            },
            phase,
            event_handlers,
            event_subscriber,
            last_tick: None,
            position: None,
            target: None,
        }
    }
}

/// A single robot taking part in the protocol.
pub struct Robot<N: Network> {
    configuration: Configuration,
    collaborators: Collaborators<N>,
    phase: Phase,
    event_handlers: EventHandlers,
    event_subscriber: Option<Receiver<Event>>,
    last_tick: Option<Tick>,
    position: Option<VertexId>,
    target: Option<VertexId>,
}

/// Everything a robot uses but does not reason about.
struct Collaborators<N: Network> {
    graph: PatrolGraph,
    estimator: Box<dyn TravelTimeEstimator>,
    generator: Box<dyn PartitionGenerator>,
    interval_estimator: Box<dyn IntervalEstimator>,
    patrol: Box<dyn PatrolAlgorithm>,
    sender: SenderHandle<N>,
    event_publisher: Option<Sender<Event>>,
}

enum Phase {
    /// Collecting peers' ids and start vertices until `until`.
    Discovering {
        starts: BTreeMap<RobotId, VertexId>,
        until: Option<Tick>,
    },

    /// The set of robots is known; territories are computed on the next tick.
    Starting(BTreeMap<RobotId, VertexId>),

    Running(Box<Running>),
}

/// A robot's protocol state once territories and meeting points are known.
struct Running {
    robots: BTreeSet<RobotId>,
    plan: MeetingPlan,
    ownership: OwnershipStore,
    meetings: MeetingStore,
    rendezvous: Rendezvous,
    redistribution: Option<Redistribution>,
}

struct Redistribution {
    redistributor: Redistributor,
    current: PartitionId,
}

impl<N: Network> Robot<N> {
    /// Advance the robot to `now`, standing at `at`. Returns the vertex the robot should head for.
    ///
    /// Ticks must be increasing. A gap between two consecutive ticks is read as the robot having been
    /// suspended: it then resynchronizes its stores before it attends any further meeting.
    pub fn tick(&mut self, now: Tick, at: VertexId) -> Result<VertexId, RobotError> {
        let me = self.configuration.me;
        let inbox = Inbox::drain(self.collaborators.sender.network(), me);
        let suspended = self
            .last_tick
            .is_some_and(|last| now.ticks_since(last) > 1);
        self.last_tick = Some(now);
        self.position = Some(at);

        if let Phase::Discovering { starts, until } = &mut self.phase {
            starts.extend(inbox.hellos.iter().map(|(robot, hello)| (*robot, hello.start)));
            let until = *until.get_or_insert(now + self.configuration.discovery_ticks);
            if now < until {
                self.collaborators.sender.broadcast(Hello { start: at });
                self.target = Some(at);
                self.drain_events();
                return Ok(at);
            }
            let starts = std::mem::take(starts);
            self.phase = Phase::Starting(starts);
        }

        if let Phase::Starting(starts) = &mut self.phase {
            let mut starts = std::mem::take(starts);
            starts.entry(me).or_insert(at);
            let running = self.start_running(&starts)?;
            self.phase = Phase::Running(Box::new(running));
        }

        let Phase::Running(running) = &mut self.phase else {
            return Ok(at);
        };

        for entries in inbox.ownership.iter().cloned() {
            running.ownership.merge(entries);
        }
        for entries in inbox.meetings.iter().cloned() {
            running.meetings.merge(entries);
        }
        if suspended {
            let until = now + self.configuration.gossip_period.max(1) + 1;
            log::debug!("{} was suspended, resyncing until {} (tick {})", me, until, now);
            running.rendezvous.resync(until);
            running.ownership.request_sync();
            running.meetings.request_sync();
        }

        let target = if running.redistribution.is_some() {
            running.redistribution_tick(&mut self.collaborators, &self.configuration, now, at, &inbox)
        } else {
            let target = running.rendezvous_tick(
                &mut self.collaborators,
                &self.configuration,
                now,
                at,
                &inbox,
            )?;
            if let Some(entries) = running.ownership.take_outgoing(now) {
                self.collaborators
                    .sender
                    .broadcast(Message::OwnershipSync(entries));
            }
            if let Some(entries) = running.meetings.take_outgoing(now) {
                self.collaborators
                    .sender
                    .broadcast(Message::MeetingSync(entries));
            }
            target
        };

        self.target = Some(target);
        self.drain_events();
        Ok(target)
    }

    /// Notify the robot that it reached `vertex` at `now`.
    pub fn on_reach_vertex(&mut self, vertex: VertexId, now: Tick) {
        self.collaborators.patrol.on_reach_vertex(vertex, now);
        self.position = Some(vertex);
        Event::publish(
            &self.collaborators.event_publisher,
            Event::ReachVertex(ReachVertexEvent {
                tick: now,
                robot: self.configuration.me,
                vertex,
            }),
        );
        self.drain_events();
    }

    pub fn me(&self) -> RobotId {
        self.configuration.me
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn is_discovering(&self) -> bool {
        !matches!(self.phase, Phase::Running(_))
    }

    /// Every robot taking part in the run, once discovery is over.
    pub fn robots(&self) -> Option<&BTreeSet<RobotId>> {
        self.running().map(|running| &running.robots)
    }

    pub fn plan(&self) -> Option<&MeetingPlan> {
        self.running().map(|running| &running.plan)
    }

    pub fn rendezvous(&self) -> Option<&Rendezvous> {
        self.running().map(|running| &running.rendezvous)
    }

    /// The local view of who owns `partition`.
    pub fn owner_of(&self, partition: PartitionId) -> Option<RobotId> {
        self.running()?
            .ownership
            .try_get_non_sending(&partition)
            .copied()
    }

    /// The partitions this robot owns according to its local view of the ownership store. Under a
    /// redistribution policy, the partition it currently patrols.
    pub fn owned_partitions(&self) -> BTreeSet<PartitionId> {
        match self.running() {
            Some(Running {
                redistribution: Some(redistribution),
                ..
            }) => [redistribution.current].into_iter().collect(),
            Some(running) => territories_owned_by(&running.ownership, self.configuration.me),
            None => BTreeSet::new(),
        }
    }

    /// The vertices of every partition this robot currently patrols.
    pub fn current_territory(&self) -> BTreeSet<VertexId> {
        match self.running() {
            Some(running) => running.territory_of(&self.owned_partitions()),
            None => BTreeSet::new(),
        }
    }

    /// The local copy of `point`'s meeting record.
    pub fn meeting_record(&self, point: &MeetingPointId) -> Option<&MeetingRecord> {
        self.running()?.meetings.try_get_non_sending(point)
    }

    /// A human-readable, multi-line dump of the robot's current state.
    pub fn debug_info(&self) -> String {
        let me = self.configuration.me;
        let tick = self
            .last_tick
            .map_or_else(|| "-".to_string(), |tick| tick.to_string());
        let position = self
            .position
            .map_or_else(|| "-".to_string(), |vertex| vertex.to_string());
        let target = self
            .target
            .map_or_else(|| "-".to_string(), |vertex| vertex.to_string());

        let mut lines = vec![format!("Robot {} (tick {})", me, tick)];
        let Some(running) = self.running() else {
            let heard = match &self.phase {
                Phase::Discovering { starts, .. } | Phase::Starting(starts) => starts.len(),
                Phase::Running(_) => 0,
            };
            lines.push(format!("  phase: Discovering, peers heard: {}", heard));
            lines.push(format!("  position: {}", position));
            return lines.join("\n");
        };

        let owned = self.owned_partitions();
        lines.push(format!(
            "  phase: Running, rendezvous: {}",
            running.rendezvous.phase()
        ));
        if let Some(meeting) = running.rendezvous.state().meeting() {
            lines.push(format!(
                "  meeting: {} at vertex {} on tick {}",
                meeting.point, meeting.vertex, meeting.tick
            ));
        }
        lines.push(format!("  position: {}, target: {}", position, target));
        lines.push(format!(
            "  owned partitions: {}",
            join(owned.iter().map(|partition| partition.to_string()))
        ));
        lines.push(format!(
            "  territory: {} vertices",
            running.territory_of(&owned).len()
        ));
        for point in running.plan.points_of(&owned) {
            if let Some(record) = running.meetings.try_get_non_sending(&point) {
                let vertex = running
                    .plan
                    .point(&point)
                    .map_or_else(|| "-".to_string(), |point| point.vertex.to_string());
                lines.push(format!(
                    "  meeting point {} at vertex {}: next {} (then {}){}, attendees {}{}",
                    point,
                    vertex,
                    record.current_next,
                    record.next_next,
                    if record.might_miss_current_next {
                        ", might miss"
                    } else {
                        ""
                    },
                    join(record.attendees.iter().map(|robot| robot.to_string())),
                    if running.rendezvous.skipped().contains(&point) {
                        ", skipped"
                    } else {
                        ""
                    }
                ));
            }
        }
        if let Some(redistribution) = &running.redistribution {
            lines.push(format!(
                "  redistribution: {:?}, patrolling {}",
                redistribution.redistributor.policy(),
                redistribution.current
            ));
        }
        lines.join("\n")
    }

    fn running(&self) -> Option<&Running> {
        match &self.phase {
            Phase::Running(running) => Some(running),
            _ => None,
        }
    }

    /// Compute territories and meeting points for `starts`, and seed both stores.
    fn start_running(&self, starts: &BTreeMap<RobotId, VertexId>) -> Result<Running, RobotError> {
        let me = self.configuration.me;
        let collaborators = &self.collaborators;
        let robots: BTreeSet<RobotId> = starts.keys().copied().collect();

        let territories = generate_territories(
            collaborators.generator.as_ref(),
            &collaborators.graph,
            collaborators.estimator.as_ref(),
            &robots,
        )?;
        let plan = MeetingPlan::build(
            territories,
            &collaborators.graph,
            collaborators.estimator.as_ref(),
            collaborators.interval_estimator.as_ref(),
            starts,
        );

        let gossip_period = self.configuration.gossip_period;
        let mut ownership = OwnershipStore::new(me, Box::new(LowestWriterWins), gossip_period);
        seed_ownership(&mut ownership, plan.territories());
        let assignment = assignment_of(&ownership, me)?;
        let mut meetings = MeetingStore::new(me, Box::new(LatestMeetingWins), gossip_period);
        seed_meetings(&mut meetings, &plan);

        let redistribution = match self.configuration.coordination {
            CoordinationMode::Rendezvous => None,
            CoordinationMode::Redistribution(policy) => {
                let current = assignment
                    .first()
                    .copied()
                    .ok_or(ConfigurationError::UnknownRobot { robot: me })?;
                Some(Redistribution {
                    redistributor: Redistributor::new(
                        policy,
                        self.configuration.seed ^ u64::from(me.int()),
                    ),
                    current,
                })
            }
        };

        log::debug!(
            "{} starts with {} robots, {} meeting points, interval {}, owning {:?}",
            me,
            robots.len(),
            plan.points().len(),
            plan.global_interval(),
            assignment
        );

        Ok(Running {
            robots,
            plan,
            ownership,
            meetings,
            rendezvous: Rendezvous::new(me),
            redistribution,
        })
    }

    fn drain_events(&self) {
        if let Some(event_subscriber) = &self.event_subscriber {
            drain_event_bus(&self.event_handlers, event_subscriber)
        }
    }
}

impl Running {
    fn territory_of(&self, partitions: &BTreeSet<PartitionId>) -> BTreeSet<VertexId> {
        partitions
            .iter()
            .filter_map(|partition| self.plan.territory(partition))
            .flat_map(|territory| territory.vertices.iter().copied())
            .collect()
    }

    fn rendezvous_tick<N: Network>(
        &mut self,
        collaborators: &mut Collaborators<N>,
        configuration: &Configuration,
        now: Tick,
        at: VertexId,
        inbox: &Inbox,
    ) -> Result<VertexId, RobotError> {
        let me = configuration.me;
        let owned = territories_owned_by(&self.ownership, me);
        let territory = self.territory_of(&owned);
        if territory.is_empty() {
            return Ok(at);
        }

        let suggestion = collaborators.patrol.suggest_next(at, &territory, now);
        let output = self.rendezvous.step(&StepContext {
            now,
            at,
            suggestion,
            plan: &self.plan,
            meetings: &self.meetings,
            estimator: collaborators.estimator.as_ref(),
            intents: &inbox.intents,
            workload: owned.len(),
        })?;

        if let Some(intent) = output.intent {
            collaborators.sender.broadcast(intent);
        }
        if let Some(meeting) = output.started_travel {
            Event::publish(
                &collaborators.event_publisher,
                Event::StartMeetingTravel(StartMeetingTravelEvent {
                    tick: now,
                    robot: me,
                    meeting,
                }),
            );
        }
        if let Some(resolution) = output.resolution {
            self.apply_resolution(collaborators, configuration, now, at, resolution)?;
        }
        Ok(output.target)
    }

    /// Write the agreed next occurrence and attendee changes of a resolved meeting, and absorb the
    /// territory of a missing robot if this robot won the takeover.
    fn apply_resolution<N: Network>(
        &mut self,
        collaborators: &mut Collaborators<N>,
        configuration: &Configuration,
        now: Tick,
        at: VertexId,
        resolution: Resolution,
    ) -> Result<(), RobotError> {
        let me = configuration.me;
        let Resolution {
            meeting,
            outcome,
            present,
            next,
        } = resolution;

        let takeovers = match &outcome {
            MeetingOutcome::Exchange => {
                Event::publish(
                    &collaborators.event_publisher,
                    Event::ExchangeInfoAtMeeting(ExchangeInfoAtMeetingEvent {
                        tick: now,
                        robot: me,
                        meeting: meeting.clone(),
                        present: present.clone(),
                    }),
                );
                Vec::new()
            }
            MeetingOutcome::Unknown(unknown) => {
                Event::publish(
                    &collaborators.event_publisher,
                    Event::UnknownRobotAtMeeting(UnknownRobotAtMeetingEvent {
                        tick: now,
                        robot: me,
                        meeting: meeting.clone(),
                        unknown: unknown.clone(),
                    }),
                );
                Vec::new()
            }
            MeetingOutcome::Missing(absent) => {
                let missing: BTreeSet<RobotId> = [*absent].into_iter().collect();
                Event::publish(
                    &collaborators.event_publisher,
                    Event::MissingRobotsAtMeeting(MissingRobotsAtMeetingEvent {
                        tick: now,
                        robot: me,
                        meeting: meeting.clone(),
                        missing: missing.clone(),
                        present: present.clone(),
                    }),
                );
                on_missing_robot_at_meeting(
                    configuration.takeover_strategy,
                    &meeting,
                    &missing,
                    &present,
                    &TakeoverContext {
                        seed: configuration.seed,
                        tick: meeting.tick,
                        plan: &self.plan,
                        ownership: &self.ownership,
                    },
                )?
            }
        };

        // Every attendee writes the same record for the meeting point it just left.
        let mut attendees = self.meetings.get_seeded(&meeting.point)?.attendees.clone();
        if let MeetingOutcome::Unknown(unknown) = &outcome {
            attendees.extend(unknown.iter().copied());
        }
        let mut record = MeetingRecord {
            current_next: next,
            next_next: self.plan.next_occurrence_after(&meeting.point, next),
            might_miss_current_next: false,
            attendees,
        };
        reassign_attendees(&mut record, &takeovers);
        self.meetings.put(meeting.point, record);

        for takeover in takeovers.iter().filter(|takeover| takeover.winner == me) {
            let partitions = absorb(
                takeover,
                &meeting,
                &self.plan,
                &mut self.ownership,
                &mut self.meetings,
                collaborators.patrol.as_mut(),
                collaborators.estimator.as_ref(),
                at,
                now,
            );
            self.rendezvous.skip(takeover.skip.iter().copied());
            Event::publish(
                &collaborators.event_publisher,
                Event::TakeOver(TakeOverEvent {
                    tick: now,
                    robot: me,
                    missing: takeover.missing,
                    partitions,
                }),
            );
        }

        self.ownership.request_sync();
        self.meetings.request_sync();
        Ok(())
    }

    fn redistribution_tick<N: Network>(
        &mut self,
        collaborators: &mut Collaborators<N>,
        configuration: &Configuration,
        now: Tick,
        at: VertexId,
        inbox: &Inbox,
    ) -> VertexId {
        let Some(redistribution) = &mut self.redistribution else {
            return at;
        };
        let vertices_of = |partition: &PartitionId| {
            self.plan
                .territory(partition)
                .map(|territory: &Territory| territory.vertices.clone())
                .unwrap_or_default()
        };
        let mut territory = vertices_of(&redistribution.current);

        // Boundary vertices double as exchange zones with the neighbouring partitions.
        let boundary: BTreeSet<PartitionId> = self
            .plan
            .points_of(&[redistribution.current].into_iter().collect())
            .iter()
            .filter_map(|point| self.plan.point(point))
            .filter(|point| point.vertex == at)
            .flat_map(|point| point.territories.iter().copied())
            .filter(|partition| *partition != redistribution.current)
            .collect();
        if !boundary.is_empty() {
            collaborators.sender.broadcast(Hello { start: at });
            let success = met_at(&inbox.hellos, at);
            for neighbour in boundary {
                redistribution.redistributor.record_exchange(neighbour, success);
            }
        }

        let decision = redistribution.redistributor.decide(&RedistributionContext {
            now,
            current: redistribution.current,
            plan: &self.plan,
            estimator: collaborators.estimator.as_ref(),
            seen_all: collaborators.patrol.has_seen_all(&territory),
        });
        if let Some(to) = decision {
            Event::publish(
                &collaborators.event_publisher,
                Event::Redistribute(RedistributeEvent {
                    tick: now,
                    robot: configuration.me,
                    from: redistribution.current,
                    to,
                }),
            );
            redistribution.current = to;
            territory = vertices_of(&to);
            collaborators.patrol.reset_seen(&territory);
        }

        collaborators.patrol.suggest_next(at, &territory, now)
    }
}

fn join(items: impl Iterator<Item = String>) -> String {
    items.collect::<Vec<_>>().join(" ")
}

/// Enumerates the errors that abort a robot's run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RobotError {
    Configuration(ConfigurationError),
    Rendezvous(RendezvousError),
    Store(StoreError),
}

impl From<ConfigurationError> for RobotError {
    fn from(value: ConfigurationError) -> Self {
        RobotError::Configuration(value)
    }
}

impl From<RendezvousError> for RobotError {
    fn from(value: RendezvousError) -> Self {
        RobotError::Rendezvous(value)
    }
}

impl From<StoreError> for RobotError {
    fn from(value: StoreError) -> Self {
        RobotError::Store(value)
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::{
        graph::ShortestPaths,
        networking::medium::{BroadcastMedium, MediumHandle},
        partition::RegionGrowingGenerator,
        patrol::LeastRecentlyVisited,
        scheduler::FixedIntervalEstimator,
        types::meeting::Meeting,
    };

    fn path(len: u32) -> PatrolGraph {
        PatrolGraph::from_edges((0..len - 1).map(|i| (VertexId::new(i), VertexId::new(i + 1), 1)))
    }

    fn configuration(me: u32) -> Configuration {
        Configuration::builder()
            .me(RobotId::new(me))
            .seed(3)
            .discovery_ticks(2)
            .gossip_period(5)
            .takeover_strategy(TakeoverStrategy::Immediate)
            .log_events(false)
            .build()
    }

    fn robot(medium: &BroadcastMedium, me: u32, graph: &PatrolGraph) -> Robot<MediumHandle> {
        RobotSpec::builder()
            .graph(graph.clone())
            .estimator(ShortestPaths::new(graph))
            .generator(RegionGrowingGenerator::new(3))
            .patrol(LeastRecentlyVisited::new())
            .network(medium.join(RobotId::new(me)))
            .configuration(configuration(me))
            .interval_estimator(FixedIntervalEstimator(10))
            .build()
            .build_robot()
    }

    #[test]
    fn discovery_agrees_on_robots_and_territories() {
        let graph = path(8);
        let medium = BroadcastMedium::new();
        let mut a = robot(&medium, 0, &graph);
        let mut b = robot(&medium, 1, &graph);

        for now in 0..=2 {
            a.tick(Tick::new(now), VertexId::new(0)).unwrap();
            b.tick(Tick::new(now), VertexId::new(7)).unwrap();
            medium.advance();
        }
        assert!(!a.is_discovering());
        assert_eq!(a.robots(), b.robots());
        assert_eq!(a.robots().unwrap().len(), 2);
        assert_eq!(
            a.plan().unwrap().territories(),
            b.plan().unwrap().territories()
        );

        let mut union = a.current_territory();
        union.extend(b.current_territory());
        assert_eq!(union, graph.vertex_set());

        let info = a.debug_info();
        assert!(info.starts_with("Robot r0 (tick 2)"), "{}", info);
        assert!(info.contains("phase: Running"));
        assert!(info.contains("owned partitions: p0\n"));
        assert!(info.contains("meeting point m0 at vertex v"));
        assert!(info.contains("attendees r0 r1"));
        assert!(b.debug_info().contains("owned partitions: p1\n"));
    }

    #[test]
    fn known_robots_skip_discovery_and_fire_reach_vertex() {
        let graph = path(4);
        let medium = BroadcastMedium::new();
        let reached = Rc::new(RefCell::new(Vec::new()));
        let sink = reached.clone();
        let mut robot = RobotSpec::builder()
            .graph(graph.clone())
            .estimator(ShortestPaths::new(&graph))
            .generator(RegionGrowingGenerator::new(3))
            .patrol(LeastRecentlyVisited::new())
            .network(medium.join(RobotId::new(0)))
            .configuration(configuration(0))
            .known_robots([(RobotId::new(0), VertexId::new(0))].into_iter().collect())
            .on_reach_vertex(move |event: &ReachVertexEvent| sink.borrow_mut().push(event.vertex))
            .build()
            .build_robot();

        let target = robot.tick(Tick::new(0), VertexId::new(0)).unwrap();
        assert!(!robot.is_discovering());
        assert_eq!(robot.current_territory(), graph.vertex_set());
        assert_ne!(target, VertexId::new(0));

        robot.on_reach_vertex(target, Tick::new(1));
        assert_eq!(*reached.borrow(), vec![target]);
    }

    #[test]
    fn unknown_attendees_join_the_meeting_record() {
        let graph = path(8);
        let medium = BroadcastMedium::new();
        let known = [(0, 0), (1, 7)]
            .into_iter()
            .map(|(robot, vertex)| (RobotId::new(robot), VertexId::new(vertex)))
            .collect();
        let mut robot = RobotSpec::builder()
            .graph(graph.clone())
            .estimator(ShortestPaths::new(&graph))
            .generator(RegionGrowingGenerator::new(3))
            .patrol(LeastRecentlyVisited::new())
            .network(medium.join(RobotId::new(0)))
            .configuration(configuration(0))
            .interval_estimator(FixedIntervalEstimator(10))
            .known_robots(known)
            .build()
            .build_robot();
        robot.tick(Tick::new(0), VertexId::new(0)).unwrap();

        let id = MeetingPointId::new(0);
        let plan = robot.plan().unwrap();
        let point = plan.point(&id).unwrap();
        let meeting = Meeting {
            point: id,
            vertex: point.vertex,
            tick: point.schedule.first_after(Tick::init()),
            attendees: point.initial_attendees.clone(),
        };
        let next = plan.next_occurrence_after(&id, meeting.tick);
        let next_next = plan.next_occurrence_after(&id, next);

        // Robot 5 showed up although nobody expected it.
        let stranger = RobotId::new(5);
        let Phase::Running(running) = &mut robot.phase else {
            panic!("robot 0 should be running");
        };
        running
            .apply_resolution(
                &mut robot.collaborators,
                &robot.configuration,
                meeting.tick,
                meeting.vertex,
                Resolution {
                    meeting: meeting.clone(),
                    outcome: MeetingOutcome::Unknown([stranger].into_iter().collect()),
                    present: [RobotId::new(0), RobotId::new(1), stranger]
                        .into_iter()
                        .collect(),
                    next,
                },
            )
            .unwrap();

        let record = robot.meeting_record(&id).unwrap();
        assert_eq!(
            record.attendees,
            [RobotId::new(0), RobotId::new(1), stranger]
                .into_iter()
                .collect()
        );
        assert_eq!(record.current_next, next);
        assert_eq!(record.next_next, next_next);
        assert!(!record.might_miss_current_next);
    }

    #[test]
    fn too_many_robots_is_a_configuration_error() {
        let graph = path(2);
        let medium = BroadcastMedium::new();
        let known = (0..3).map(|i| (RobotId::new(i), VertexId::new(0))).collect();
        let mut robot = RobotSpec::builder()
            .graph(graph.clone())
            .estimator(ShortestPaths::new(&graph))
            .generator(RegionGrowingGenerator::new(3))
            .patrol(LeastRecentlyVisited::new())
            .network(medium.join(RobotId::new(0)))
            .configuration(configuration(0))
            .known_robots(known)
            .build()
            .build_robot();

        assert!(matches!(
            robot.tick(Tick::new(0), VertexId::new(0)),
            Err(RobotError::Configuration(_))
        ));
    }
}
