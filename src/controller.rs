// file: src/controller.rs
// description: reconnection, heartbeat and fallback state machine driven by the channel client

use crate::{
    backoff::{Backoff, BackoffSchedule},
    types::{CLOSE_HEARTBEAT_TIMEOUT, CLOSE_NORMAL, ConnectionState, TransportKind},
};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_PUSH_FAILURES: u32 = 3;

/// Everything that can move the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlInput {
    Start,
    Stop,
    TransportOpened,
    TransportClosed { code: u16 },
    ReconnectDue,
    HeartbeatDue,
    PongReceived,
    PongTimeout,
    VisibilityChanged { visible: bool },
}

/// Side effects requested by the controller; executed in order by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ConnectPush,
    StartPolling,
    CloseTransport { code: u16 },
    ScheduleReconnect { attempt: u32, delay: Duration },
    CancelReconnect,
    StartHeartbeat,
    StopHeartbeat,
    SendPing,
    ArmPongTimeout,
    DisarmPongTimeout,
    Resubscribe,
    FlushQueue,
    PausePolling,
    ResumePolling,
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
}

/// Owns the [`ConnectionState`]. Holds no clock and performs no I/O: timers and
/// transports live in the client, which feeds their outcomes back as inputs.
#[derive(Debug, Clone)]
pub struct ReconnectController {
    state: ConnectionState,
    backoff: Backoff,
    max_push_failures: u32,
    started: bool,
    visible: bool,
    heartbeat_running: bool,
    awaiting_pong: bool,
    transport: Option<TransportKind>,
}

impl ReconnectController {
    pub fn new(schedule: BackoffSchedule, max_push_failures: u32) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            backoff: Backoff::new(schedule),
            max_push_failures,
            started: false,
            visible: true,
            heartbeat_running: false,
            awaiting_pong: false,
            transport: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive push failures since the last successful open.
    pub fn attempt(&self) -> u32 {
        self.backoff.attempt()
    }

    pub fn current_delay(&self) -> Duration {
        self.backoff.current_delay()
    }

    pub fn transport(&self) -> Option<TransportKind> {
        self.transport
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn awaiting_pong(&self) -> bool {
        self.awaiting_pong
    }

    pub fn handle(&mut self, input: ControlInput) -> Vec<Command> {
        let mut commands = Vec::new();

        match input {
            ControlInput::Start => self.on_start(&mut commands),
            ControlInput::Stop => self.on_stop(&mut commands),
            ControlInput::TransportOpened => self.on_open(&mut commands),
            ControlInput::TransportClosed { code } => self.on_close(code, &mut commands),
            ControlInput::ReconnectDue => {
                if self.state == ConnectionState::Disconnected && self.started {
                    self.connect_push(&mut commands);
                }
            }
            ControlInput::HeartbeatDue => {
                if self.state == ConnectionState::Connected
                    && self.visible
                    && self.heartbeat_running
                    && !self.awaiting_pong
                {
                    self.awaiting_pong = true;
                    commands.push(Command::SendPing);
                    commands.push(Command::ArmPongTimeout);
                }
            }
            ControlInput::PongReceived => {
                if self.awaiting_pong {
                    self.awaiting_pong = false;
                    commands.push(Command::DisarmPongTimeout);
                }
            }
            ControlInput::PongTimeout => {
                if self.state == ConnectionState::Connected && self.awaiting_pong {
                    warn!("No pong within heartbeat timeout, treating connection as dead");
                    commands.push(Command::CloseTransport {
                        code: CLOSE_HEARTBEAT_TIMEOUT,
                    });
                    self.push_failed(&mut commands);
                }
            }
            ControlInput::VisibilityChanged { visible } => {
                self.on_visibility(visible, &mut commands)
            }
        }

        commands
    }

    fn on_start(&mut self, commands: &mut Vec<Command>) {
        if self.started || self.state != ConnectionState::Disconnected {
            debug!(state = %self.state, "Ignoring start");
            return;
        }
        self.started = true;
        self.connect_push(commands);
    }

    fn on_stop(&mut self, commands: &mut Vec<Command>) {
        if self.state == ConnectionState::Closed {
            return;
        }

        commands.push(Command::CancelReconnect);
        self.stop_heartbeat(commands);
        if self.transport.take().is_some() {
            commands.push(Command::CloseTransport { code: CLOSE_NORMAL });
        }
        self.transition(ConnectionState::Closed, commands);
    }

    fn on_open(&mut self, commands: &mut Vec<Command>) {
        match self.state {
            ConnectionState::Connecting => {
                self.backoff.reset();
                self.transition(ConnectionState::Connected, commands);
                commands.push(Command::Resubscribe);
                commands.push(Command::FlushQueue);
                if self.visible {
                    self.heartbeat_running = true;
                    commands.push(Command::StartHeartbeat);
                }
            }
            ConnectionState::Degraded => commands.push(Command::FlushQueue),
            _ => debug!(state = %self.state, "Ignoring stale open"),
        }
    }

    fn on_close(&mut self, code: u16, commands: &mut Vec<Command>) {
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            debug!(state = %self.state, code, "Ignoring close outside an active push connection");
            return;
        }

        if code == CLOSE_NORMAL {
            info!("Push transport closed normally");
            self.stop_heartbeat(commands);
            self.transport = None;
            self.transition(ConnectionState::Closed, commands);
            return;
        }

        self.push_failed(commands);
    }

    fn on_visibility(&mut self, visible: bool, commands: &mut Vec<Command>) {
        if visible == self.visible {
            return;
        }
        self.visible = visible;

        if !visible {
            self.stop_heartbeat(commands);
            if self.state == ConnectionState::Degraded {
                commands.push(Command::PausePolling);
            }
            return;
        }

        match self.state {
            ConnectionState::Connected => {
                self.heartbeat_running = true;
                commands.push(Command::StartHeartbeat);
            }
            ConnectionState::Degraded => commands.push(Command::ResumePolling),
            ConnectionState::Disconnected if self.started => {
                info!(attempt = self.attempt(), "Page visible again, reconnecting immediately");
                commands.push(Command::CancelReconnect);
                self.connect_push(commands);
            }
            _ => {}
        }
    }

    fn connect_push(&mut self, commands: &mut Vec<Command>) {
        self.transport = Some(TransportKind::Push);
        self.transition(ConnectionState::Connecting, commands);
        commands.push(Command::ConnectPush);
    }

    fn push_failed(&mut self, commands: &mut Vec<Command>) {
        self.stop_heartbeat(commands);
        self.transport = None;

        let (attempt, delay) = self.backoff.record_failure();
        if attempt > self.max_push_failures {
            warn!(
                attempt,
                ceiling = self.max_push_failures,
                "Push transport exhausted, falling back to polling"
            );
            self.transport = Some(TransportKind::Pull);
            self.transition(ConnectionState::Degraded, commands);
            commands.push(Command::StartPolling);
            if !self.visible {
                commands.push(Command::PausePolling);
            }
            return;
        }

        self.transition(ConnectionState::Disconnected, commands);
        commands.push(Command::ScheduleReconnect { attempt, delay });
    }

    fn stop_heartbeat(&mut self, commands: &mut Vec<Command>) {
        if self.heartbeat_running {
            self.heartbeat_running = false;
            commands.push(Command::StopHeartbeat);
        }
        if self.awaiting_pong {
            self.awaiting_pong = false;
            commands.push(Command::DisarmPongTimeout);
        }
    }

    fn transition(&mut self, to: ConnectionState, commands: &mut Vec<Command>) {
        let from = self.state;
        if from == to {
            return;
        }
        debug!(%from, %to, "Connection state transition");
        self.state = to;
        commands.push(Command::StateChanged { from, to });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CLOSE_ABNORMAL;

    fn controller() -> ReconnectController {
        ReconnectController::new(
            BackoffSchedule::new(Duration::from_secs(1), 2.0, Duration::from_secs(30)),
            3,
        )
    }

    fn connected() -> ReconnectController {
        let mut c = controller();
        c.handle(ControlInput::Start);
        c.handle(ControlInput::TransportOpened);
        assert_eq!(c.state(), ConnectionState::Connected);
        c
    }

    fn abnormal() -> ControlInput {
        ControlInput::TransportClosed {
            code: CLOSE_ABNORMAL,
        }
    }

    #[test]
    fn test_start_connects_push() {
        let mut c = controller();
        let cmds = c.handle(ControlInput::Start);
        assert_eq!(
            cmds,
            vec![
                Command::StateChanged {
                    from: ConnectionState::Disconnected,
                    to: ConnectionState::Connecting
                },
                Command::ConnectPush
            ]
        );
        assert!(c.handle(ControlInput::Start).is_empty());
    }

    #[test]
    fn test_open_resubscribes_then_flushes() {
        let mut c = controller();
        c.handle(ControlInput::Start);
        let cmds = c.handle(ControlInput::TransportOpened);

        let resubscribe = cmds.iter().position(|c| *c == Command::Resubscribe).unwrap();
        let flush = cmds.iter().position(|c| *c == Command::FlushQueue).unwrap();
        assert!(resubscribe < flush);
        assert!(cmds.contains(&Command::StartHeartbeat));
    }

    #[test]
    fn test_attempts_increase_until_degraded_and_stay_there() {
        let mut c = controller();
        c.handle(ControlInput::Start);

        let mut last_attempt = 0;
        for expected in 1..=3 {
            let cmds = c.handle(abnormal());
            assert_eq!(c.state(), ConnectionState::Disconnected);
            assert!(c.attempt() > last_attempt);
            last_attempt = c.attempt();
            assert!(cmds.contains(&Command::ScheduleReconnect {
                attempt: expected,
                delay: Duration::from_secs(1 << expected),
            }));
            c.handle(ControlInput::ReconnectDue);
            assert_eq!(c.state(), ConnectionState::Connecting);
        }

        let cmds = c.handle(abnormal());
        assert_eq!(c.state(), ConnectionState::Degraded);
        assert!(cmds.contains(&Command::StartPolling));
        assert_eq!(c.transport(), Some(TransportKind::Pull));

        // nothing brings the push transport back
        for input in [
            ControlInput::ReconnectDue,
            ControlInput::Start,
            abnormal(),
            ControlInput::VisibilityChanged { visible: false },
            ControlInput::VisibilityChanged { visible: true },
        ] {
            let cmds = c.handle(input);
            assert!(!cmds.contains(&Command::ConnectPush));
            assert_eq!(c.state(), ConnectionState::Degraded);
        }
    }

    #[test]
    fn test_successful_open_resets_attempts() {
        let mut c = controller();
        c.handle(ControlInput::Start);
        c.handle(abnormal());
        c.handle(ControlInput::ReconnectDue);
        c.handle(abnormal());
        assert_eq!(c.attempt(), 2);

        c.handle(ControlInput::ReconnectDue);
        c.handle(ControlInput::TransportOpened);
        assert_eq!(c.attempt(), 0);
        assert_eq!(c.current_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_normal_close_ends_without_retry() {
        let mut c = connected();
        let cmds = c.handle(ControlInput::TransportClosed { code: CLOSE_NORMAL });
        assert_eq!(c.state(), ConnectionState::Closed);
        assert!(!cmds.iter().any(|c| matches!(c, Command::ScheduleReconnect { .. })));
    }

    #[test]
    fn test_missing_pong_forces_close_and_retry_at_attempt_one() {
        let mut c = connected();
        assert_eq!(
            c.handle(ControlInput::HeartbeatDue),
            vec![Command::SendPing, Command::ArmPongTimeout]
        );
        // a second tick while waiting does not stack pings
        assert!(c.handle(ControlInput::HeartbeatDue).is_empty());

        let cmds = c.handle(ControlInput::PongTimeout);
        assert_eq!(
            cmds.first(),
            Some(&Command::CloseTransport {
                code: CLOSE_HEARTBEAT_TIMEOUT
            })
        );
        assert!(cmds.contains(&Command::ScheduleReconnect {
            attempt: 1,
            delay: Duration::from_secs(2),
        }));
        assert_eq!(c.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_pong_disarms_timeout() {
        let mut c = connected();
        c.handle(ControlInput::HeartbeatDue);
        assert_eq!(
            c.handle(ControlInput::PongReceived),
            vec![Command::DisarmPongTimeout]
        );
        assert!(c.handle(ControlInput::PongTimeout).is_empty());
        assert_eq!(c.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_visible_while_disconnected_reconnects_immediately() {
        let mut c = controller();
        c.handle(ControlInput::Start);
        c.handle(abnormal());
        assert_eq!(c.state(), ConnectionState::Disconnected);

        assert!(
            c.handle(ControlInput::VisibilityChanged { visible: false })
                .iter()
                .all(|cmd| !matches!(cmd, Command::ConnectPush))
        );
        let cmds = c.handle(ControlInput::VisibilityChanged { visible: true });
        assert_eq!(cmds.first(), Some(&Command::CancelReconnect));
        assert!(cmds.contains(&Command::ConnectPush));
        assert_eq!(c.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_hidden_page_pauses_heartbeat_and_polling() {
        let mut c = connected();
        let cmds = c.handle(ControlInput::VisibilityChanged { visible: false });
        assert_eq!(cmds, vec![Command::StopHeartbeat]);
        assert!(c.handle(ControlInput::HeartbeatDue).is_empty());

        let cmds = c.handle(ControlInput::VisibilityChanged { visible: true });
        assert_eq!(cmds, vec![Command::StartHeartbeat]);

        let mut degraded = controller();
        degraded.handle(ControlInput::Start);
        for _ in 0..4 {
            degraded.handle(abnormal());
            degraded.handle(ControlInput::ReconnectDue);
        }
        assert_eq!(degraded.state(), ConnectionState::Degraded);
        assert_eq!(
            degraded.handle(ControlInput::VisibilityChanged { visible: false }),
            vec![Command::PausePolling]
        );
        assert_eq!(
            degraded.handle(ControlInput::VisibilityChanged { visible: true }),
            vec![Command::ResumePolling]
        );
    }

    #[test]
    fn test_stop_is_idempotent_and_valid_before_start() {
        let mut idle = controller();
        let cmds = idle.handle(ControlInput::Stop);
        assert!(!cmds.iter().any(|c| matches!(c, Command::CloseTransport { .. })));
        assert_eq!(idle.state(), ConnectionState::Closed);
        assert!(idle.handle(ControlInput::Stop).is_empty());
        assert!(idle.handle(ControlInput::Start).is_empty());

        let mut live = connected();
        let cmds = live.handle(ControlInput::Stop);
        assert!(cmds.contains(&Command::CancelReconnect));
        assert!(cmds.contains(&Command::StopHeartbeat));
        assert!(cmds.contains(&Command::CloseTransport { code: CLOSE_NORMAL }));
        assert!(live.handle(ControlInput::Stop).is_empty());
        assert!(live.handle(ControlInput::ReconnectDue).is_empty());
    }
}
