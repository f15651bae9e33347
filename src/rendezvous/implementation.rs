/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Tick-driven implementation of the rendezvous state machine.
//!
//! Main type: [`Rendezvous`].

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{
    basic::{MeetingPointId, RobotId, Tick},
    meeting::Meeting,
};

use super::{
    messages::MeetingIntent,
    types::{MeetingOutcome, RendezvousPhase, RendezvousState, Resolution, StepContext, StepOutput},
    MeetingStore,
};

/// A single robot's participant in the rendezvous protocol.
///
/// # Usage
///
/// After creating an instance with [`new`](Self::new), the caller should call [`step`](Self::step)
/// exactly once per tick, and act on the returned [`StepOutput`]: move towards its `target`, broadcast
/// its `intent`, and apply its `resolution` (if any) to the replicated stores.
pub struct Rendezvous {
    me: RobotId,
    state: RendezvousState,

    /// Meeting points this robot no longer attends, e.g. because a takeover made it the only robot
    /// left at them.
    skip: BTreeSet<MeetingPointId>,

    /// The last occurrence resolved at each meeting point. Stops the robot from attending an occurrence
    /// twice while the store has not caught up yet.
    resolved: BTreeMap<MeetingPointId, Tick>,

    /// Peers heard from about the current meeting.
    heard: BTreeMap<RobotId, Heard>,
    proposals: BTreeMap<RobotId, Tick>,

    /// No meeting is attended before this tick.
    resync_until: Tick,
}

#[derive(Clone, Copy, Debug)]
struct Heard {
    at: Tick,
    arrived: bool,
}

impl Rendezvous {
    pub fn new(me: RobotId) -> Self {
        Self {
            me,
            state: RendezvousState::Patrolling,
            skip: BTreeSet::new(),
            resolved: BTreeMap::new(),
            heard: BTreeMap::new(),
            proposals: BTreeMap::new(),
            resync_until: Tick::init(),
        }
    }

    pub fn state(&self) -> &RendezvousState {
        &self.state
    }

    pub fn phase(&self) -> RendezvousPhase {
        self.state.phase()
    }

    pub fn skipped(&self) -> &BTreeSet<MeetingPointId> {
        &self.skip
    }

    /// Stop attending `points`.
    pub fn skip(&mut self, points: impl IntoIterator<Item = MeetingPointId>) {
        self.skip.extend(points);
    }

    /// Abandon whatever meeting the robot was heading to and attend no meeting before `until`. Used
    /// when the robot's view of the meeting store may be stale, e.g. after it was suspended.
    pub fn resync(&mut self, until: Tick) {
        self.resync_until = until;
        self.enter_patrolling();
    }

    /// Decide what to do at `ctx.now`.
    pub fn step(&mut self, ctx: &StepContext) -> Result<StepOutput, RendezvousError> {
        let mut output = StepOutput::patrol(ctx.suggestion);

        // 1. Give up on meetings that are over, or that no longer expect us.
        if let RendezvousState::EnRouteToMeeting { meeting }
        | RendezvousState::AtMeetingWaitingForPeers { meeting } = &self.state
        {
            if ctx.now > meeting.tick
                || ctx.now < self.resync_until
                || !self.expected(meeting, ctx.meetings).contains(&self.me)
            {
                log::debug!(
                    "{} abandons meeting {} at {} (tick {})",
                    self.me,
                    meeting.point,
                    meeting.tick,
                    ctx.now
                );
                self.enter_patrolling();
            }
        }

        match self.state.clone() {
            RendezvousState::Patrolling => {
                if ctx.now < self.resync_until {
                    return Ok(output);
                }

                // 2. Depart for a meeting a peer has already departed for, or for the earliest meeting
                //    we would otherwise be late for.
                let upcoming = self.upcoming(ctx);
                let forced = upcoming
                    .iter()
                    .find(|meeting| ctx.intents.iter().any(|(_, intent)| intent.is_for(meeting)));
                let departure = match forced {
                    Some(meeting) => Some(meeting.clone()),
                    None => upcoming
                        .first()
                        .filter(|meeting| must_depart(ctx, meeting))
                        .cloned(),
                };

                if let Some(meeting) = departure {
                    log::debug!(
                        "{} departs for meeting {} at {} on {} (tick {})",
                        self.me,
                        meeting.point,
                        meeting.vertex,
                        meeting.tick,
                        ctx.now
                    );
                    self.heard.clear();
                    self.proposals.clear();
                    output.started_travel = Some(meeting.clone());
                    self.state = RendezvousState::EnRouteToMeeting { meeting };
                    self.travel(ctx, &mut output)?;
                }
            }

            RendezvousState::EnRouteToMeeting { .. }
            | RendezvousState::AtMeetingWaitingForPeers { .. } => self.travel(ctx, &mut output)?,

            // 3. Resolution states last exactly one tick. Keep announcing ourselves so that peers who
            //    resolve a tick later still sense us.
            RendezvousState::ExchangingInfo { meeting }
            | RendezvousState::HandlingUnknownRobot { meeting, .. }
            | RendezvousState::HandlingMissingRobot { meeting, .. } => {
                output.target = meeting.vertex;
                output.intent = Some(self.intent(ctx, &meeting));
                self.enter_patrolling();
            }
        }

        Ok(output)
    }

    /// Every meeting this robot attends, earliest first, each at its next unresolved occurrence that is
    /// not in the past.
    pub fn upcoming(&self, ctx: &StepContext) -> Vec<Meeting> {
        let mut meetings: Vec<Meeting> = ctx
            .meetings
            .entries()
            .filter(|entry| !self.skip.contains(&entry.key))
            .filter(|entry| {
                entry.value.attendees.contains(&self.me) && !entry.value.is_solo(self.me)
            })
            .filter_map(|entry| {
                let point = entry.key;
                let vertex = ctx.plan.point(&point)?.vertex;
                let mut record = ctx.plan.next_meeting(&point, &entry.value, ctx.now);
                if let Some(resolved) = self.resolved.get(&point) {
                    while record.current_next <= *resolved {
                        record = ctx.plan.held_meeting(&point, &record);
                    }
                }
                if record.current_next.is_never() {
                    return None;
                }
                Some(Meeting {
                    point,
                    vertex,
                    tick: record.current_next,
                    attendees: record.attendees,
                })
            })
            .collect();
        meetings.sort_by_key(|meeting| (meeting.tick, meeting.point));
        meetings
    }

    /// Travel to, then wait at, the meeting in the current state, resolving it once waiting ends.
    fn travel(&mut self, ctx: &StepContext, output: &mut StepOutput) -> Result<(), RendezvousError> {
        let meeting = match &self.state {
            RendezvousState::EnRouteToMeeting { meeting }
            | RendezvousState::AtMeetingWaitingForPeers { meeting } => meeting.clone(),
            _ => return Ok(()),
        };
        self.listen(ctx, &meeting);

        let arrived = ctx.at == meeting.vertex;
        if matches!(self.state, RendezvousState::EnRouteToMeeting { .. })
            && (arrived || ctx.now >= meeting.tick)
        {
            log::debug!(
                "{} waits for meeting {} at {} (tick {})",
                self.me,
                meeting.point,
                meeting.vertex,
                ctx.now
            );
            self.state = RendezvousState::AtMeetingWaitingForPeers {
                meeting: meeting.clone(),
            };
        }

        output.target = meeting.vertex;
        output.intent = Some(self.intent(ctx, &meeting));

        if let RendezvousState::AtMeetingWaitingForPeers { .. } = self.state {
            let expected = self.expected(&meeting, ctx.meetings);
            let everyone_arrived = expected
                .iter()
                .filter(|peer| **peer != self.me)
                .all(|peer| {
                    self.heard
                        .get(peer)
                        .is_some_and(|heard| heard.arrived && heard.at == ctx.now)
                });
            if (arrived && everyone_arrived) || ctx.now >= meeting.tick {
                output.resolution = Some(self.resolve(ctx, meeting, expected)?);
            }
        }
        Ok(())
    }

    /// Remember which peers announced the same occurrence, and what they proposed.
    fn listen(&mut self, ctx: &StepContext, meeting: &Meeting) {
        for (origin, intent) in ctx.intents {
            if *origin != self.me && intent.is_for(meeting) {
                self.heard.insert(
                    *origin,
                    Heard {
                        at: ctx.now,
                        arrived: intent.arrived,
                    },
                );
                self.proposals.insert(*origin, intent.proposed_next);
            }
        }
    }

    /// Classify the meeting and move into the matching resolution state.
    fn resolve(
        &mut self,
        ctx: &StepContext,
        meeting: Meeting,
        expected: BTreeSet<RobotId>,
    ) -> Result<Resolution, RendezvousError> {
        // A peer counts as present if we heard from it this tick or the previous one.
        let present: BTreeSet<RobotId> = self
            .heard
            .iter()
            .filter(|(_, heard)| heard.at + 1 >= ctx.now)
            .map(|(robot, _)| *robot)
            .chain(std::iter::once(self.me))
            .collect();
        let missing: BTreeSet<RobotId> = expected.difference(&present).copied().collect();
        let unknown: BTreeSet<RobotId> = present.difference(&expected).copied().collect();

        if missing.len() > 1 {
            return Err(RendezvousError::MultipleMissingRobots {
                point: meeting.point,
                tick: meeting.tick,
                missing,
            });
        }

        let excused = ctx
            .meetings
            .try_get_non_sending(&meeting.point)
            .is_some_and(|record| {
                record.might_miss_current_next && record.current_next == meeting.tick
            });
        let outcome = match missing.first() {
            Some(absent) if !excused => MeetingOutcome::Missing(*absent),
            Some(_) => MeetingOutcome::Exchange,
            None if !unknown.is_empty() => MeetingOutcome::Unknown(unknown),
            None => MeetingOutcome::Exchange,
        };

        let mine = self.proposal(ctx, &meeting);
        let next = present
            .iter()
            .filter_map(|robot| {
                if *robot == self.me {
                    Some(mine)
                } else {
                    self.proposals.get(robot).copied()
                }
            })
            .max()
            .unwrap_or(mine);

        log::debug!(
            "{} resolves meeting {} at {} as {:?}, next at {}",
            self.me,
            meeting.point,
            meeting.tick,
            outcome,
            next
        );
        self.resolved.insert(meeting.point, meeting.tick);
        self.state = match &outcome {
            MeetingOutcome::Exchange => RendezvousState::ExchangingInfo {
                meeting: meeting.clone(),
            },
            MeetingOutcome::Unknown(unknown) => RendezvousState::HandlingUnknownRobot {
                meeting: meeting.clone(),
                unknown: unknown.clone(),
            },
            MeetingOutcome::Missing(absent) => RendezvousState::HandlingMissingRobot {
                meeting: meeting.clone(),
                missing: *absent,
            },
        };

        Ok(Resolution {
            meeting,
            outcome,
            present,
            next,
        })
    }

    fn intent(&self, ctx: &StepContext, meeting: &Meeting) -> MeetingIntent {
        MeetingIntent {
            meeting: meeting.clone(),
            arrived: ctx.at == meeting.vertex,
            proposed_next: self.proposal(ctx, meeting),
        }
    }

    /// The first occurrence after `meeting` that leaves one global interval of extra time for every
    /// territory owned beyond the first.
    fn proposal(&self, ctx: &StepContext, meeting: &Meeting) -> Tick {
        let slack = (ctx.workload.saturating_sub(1) as u64).saturating_mul(ctx.plan.global_interval());
        ctx.plan
            .next_occurrence_after(&meeting.point, meeting.tick + slack)
    }

    /// The attendees currently expected at `meeting`, according to the freshest record we hold.
    fn expected(&self, meeting: &Meeting, meetings: &MeetingStore) -> BTreeSet<RobotId> {
        meetings
            .try_get_non_sending(&meeting.point)
            .map_or_else(|| meeting.attendees.clone(), |record| record.attendees.clone())
    }

    fn enter_patrolling(&mut self) {
        self.state = RendezvousState::Patrolling;
        self.heard.clear();
        self.proposals.clear();
    }
}

/// Whether a robot that first visits the suggested vertex could no longer be at `meeting` before its
/// tick. Unknown travel times count as "too late".
fn must_depart(ctx: &StepContext, meeting: &Meeting) -> bool {
    let to_suggestion = ctx.estimator.estimate(ctx.at, ctx.suggestion);
    let to_meeting = ctx.estimator.estimate(ctx.suggestion, meeting.vertex);
    match (to_suggestion, to_meeting) {
        (Some(first), Some(second)) => ctx.now + first.saturating_add(second) >= meeting.tick,
        _ => true,
    }
}

/// Enumerates the protocol invariant violations the rendezvous protocol cannot recover from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendezvousError {
    /// More than one expected robot was absent from a single meeting. Only one absentee per meeting is
    /// supported.
    MultipleMissingRobots {
        point: MeetingPointId,
        tick: Tick,
        missing: BTreeSet<RobotId>,
    },

    /// A takeover strategy chose a robot that was not present at the meeting.
    TakeoverTargetNotPresent {
        point: MeetingPointId,
        winner: RobotId,
    },
}
