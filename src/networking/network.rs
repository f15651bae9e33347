use crate::types::basic::RobotId;

use super::messages::Message;

/// A broadcast channel with one-tick delivery latency.
pub trait Network {
    /// Broadcast a message to every robot currently in range. Must not block.
    fn broadcast(&mut self, message: Message);

    /// Receive the next message delivered this tick, together with the robot that sent it. Returns
    /// immediately with a `None` once this tick's inbox is empty.
    fn recv(&mut self) -> Option<(RobotId, Message)>;
}
