use crate::events::*;
use crate::logging::Logger;
use std::sync::mpsc::Receiver;

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T)>;

pub(crate) struct EventHandlers {
    pub(crate) exchange_info_at_meeting_handlers: Vec<HandlerPtr<ExchangeInfoAtMeetingEvent>>,
    pub(crate) missing_robots_at_meeting_handlers: Vec<HandlerPtr<MissingRobotsAtMeetingEvent>>,
    pub(crate) unknown_robot_at_meeting_handlers: Vec<HandlerPtr<UnknownRobotAtMeetingEvent>>,
    pub(crate) start_meeting_travel_handlers: Vec<HandlerPtr<StartMeetingTravelEvent>>,
    pub(crate) reach_vertex_handlers: Vec<HandlerPtr<ReachVertexEvent>>,
    pub(crate) take_over_handlers: Vec<HandlerPtr<TakeOverEvent>>,
    pub(crate) redistribute_handlers: Vec<HandlerPtr<RedistributeEvent>>,
}

/// The user-supplied handlers, at most one per event type.
#[derive(Default)]
pub(crate) struct UserHandlers {
    pub(crate) exchange_info_at_meeting: Option<HandlerPtr<ExchangeInfoAtMeetingEvent>>,
    pub(crate) missing_robots_at_meeting: Option<HandlerPtr<MissingRobotsAtMeetingEvent>>,
    pub(crate) unknown_robot_at_meeting: Option<HandlerPtr<UnknownRobotAtMeetingEvent>>,
    pub(crate) start_meeting_travel: Option<HandlerPtr<StartMeetingTravelEvent>>,
    pub(crate) reach_vertex: Option<HandlerPtr<ReachVertexEvent>>,
    pub(crate) take_over: Option<HandlerPtr<TakeOverEvent>>,
    pub(crate) redistribute: Option<HandlerPtr<RedistributeEvent>>,
}

impl EventHandlers {
    /// Collect the user's handlers, preceded by the default loggers if `log_events` is set.
    pub(crate) fn new(log_events: bool, user: UserHandlers) -> EventHandlers {
        fn handlers<E: Logger>(log_events: bool, user: Option<HandlerPtr<E>>) -> Vec<HandlerPtr<E>> {
            let mut handlers = Vec::new();
            if log_events {
                handlers.push(E::get_logger());
            }
            handlers.extend(user);
            handlers
        }

        EventHandlers {
            exchange_info_at_meeting_handlers: handlers(log_events, user.exchange_info_at_meeting),
            missing_robots_at_meeting_handlers: handlers(log_events, user.missing_robots_at_meeting),
            unknown_robot_at_meeting_handlers: handlers(log_events, user.unknown_robot_at_meeting),
            start_meeting_travel_handlers: handlers(log_events, user.start_meeting_travel),
            reach_vertex_handlers: handlers(log_events, user.reach_vertex),
            take_over_handlers: handlers(log_events, user.take_over),
            redistribute_handlers: handlers(log_events, user.redistribute),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.exchange_info_at_meeting_handlers.is_empty()
            && self.missing_robots_at_meeting_handlers.is_empty()
            && self.unknown_robot_at_meeting_handlers.is_empty()
            && self.start_meeting_travel_handlers.is_empty()
            && self.reach_vertex_handlers.is_empty()
            && self.take_over_handlers.is_empty()
            && self.redistribute_handlers.is_empty()
    }

    pub fn fire_handlers(&self, event: Event) {
        match event {
            Event::ExchangeInfoAtMeeting(exchange_info_at_meeting_event) => self
                .exchange_info_at_meeting_handlers
                .iter()
                .for_each(|handler| handler(&exchange_info_at_meeting_event)),

            Event::MissingRobotsAtMeeting(missing_robots_at_meeting_event) => self
                .missing_robots_at_meeting_handlers
                .iter()
                .for_each(|handler| handler(&missing_robots_at_meeting_event)),

            Event::UnknownRobotAtMeeting(unknown_robot_at_meeting_event) => self
                .unknown_robot_at_meeting_handlers
                .iter()
                .for_each(|handler| handler(&unknown_robot_at_meeting_event)),

            Event::StartMeetingTravel(start_meeting_travel_event) => self
                .start_meeting_travel_handlers
                .iter()
                .for_each(|handler| handler(&start_meeting_travel_event)),

            Event::ReachVertex(reach_vertex_event) => self
                .reach_vertex_handlers
                .iter()
                .for_each(|handler| handler(&reach_vertex_event)),

            Event::TakeOver(take_over_event) => self
                .take_over_handlers
                .iter()
                .for_each(|handler| handler(&take_over_event)),

            Event::Redistribute(redistribute_event) => self
                .redistribute_handlers
                .iter()
                .for_each(|handler| handler(&redistribute_event)),
        }
    }
}

/// Fire the handlers of every event published so far. Execution is single-threaded, so instead of
/// running on its own thread the bus is drained by the robot at the end of every tick.
pub(crate) fn drain_event_bus(event_handlers: &EventHandlers, event_subscriber: &Receiver<Event>) {
    while let Ok(event) = event_subscriber.try_recv() {
        event_handlers.fire_handlers(event)
    }
}
