//! Keepalive and ping countdowns
//!
//! Both timers are disabled by default. The keepalive countdown restarts on
//! every received message; the ping countdown restarts on every send.

use std::time::Duration;

/// Timer settings for a link
#[derive(Clone, Debug)]
pub struct KeepaliveConfig {
    /// Close a connection that stays silent this long
    pub keepalive_timeout: Duration,
    /// Time allowed for a peer to connect and say hello while listening
    pub handshake_timeout: Duration,
    /// Send a ping after this long without sending anything
    pub ping_interval: Duration,
    pub use_keepalive: bool,
    pub use_ping: bool,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        KeepaliveConfig {
            keepalive_timeout: Duration::from_secs(300),
            handshake_timeout: Duration::from_secs(60),
            ping_interval: Duration::from_secs(120),
            use_keepalive: false,
            use_ping: false,
        }
    }
}

/// What the caller should do after advancing the timers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeepaliveAction {
    None,
    /// Ping countdown expired
    SendPing,
    /// Keepalive countdown expired; the link is stale
    Stale,
}

/// Countdown state
#[derive(Clone, Debug)]
pub struct Keepalive {
    config: KeepaliveConfig,
    keepalive_remaining: Duration,
    ping_remaining: Duration,
}

impl Keepalive {
    pub fn new(config: KeepaliveConfig) -> Self {
        Keepalive {
            keepalive_remaining: config.keepalive_timeout,
            ping_remaining: config.ping_interval,
            config,
        }
    }

    pub fn config(&self) -> &KeepaliveConfig {
        &self.config
    }

    /// Restart the keepalive countdown after a received message
    #[inline]
    pub fn on_receive(&mut self) {
        self.keepalive_remaining = self.config.keepalive_timeout;
    }

    /// Restart the ping countdown after a send
    #[inline]
    pub fn on_send(&mut self) {
        self.ping_remaining = self.config.ping_interval;
    }

    /// Start the handshake window while waiting for a peer
    pub fn arm_handshake(&mut self) {
        self.keepalive_remaining = self.config.handshake_timeout;
    }

    /// Restart both countdowns for a fresh peer
    pub fn arm_peer(&mut self) {
        self.keepalive_remaining = self.config.keepalive_timeout;
        self.ping_remaining = self.config.ping_interval;
    }

    pub fn keepalive_remaining(&self) -> Duration {
        self.keepalive_remaining
    }

    pub fn ping_remaining(&self) -> Duration {
        self.ping_remaining
    }

    /// Count down by `elapsed`.
    ///
    /// `connected` selects whether the ping countdown runs; the keepalive
    /// countdown runs whenever the link is active.
    pub fn advance(&mut self, elapsed: Duration, connected: bool) -> KeepaliveAction {
        self.keepalive_remaining = self.keepalive_remaining.saturating_sub(elapsed);
        if connected {
            self.ping_remaining = self.ping_remaining.saturating_sub(elapsed);
        }

        if self.config.use_keepalive && self.keepalive_remaining.is_zero() {
            return KeepaliveAction::Stale;
        }
        if connected && self.config.use_ping && self.ping_remaining.is_zero() {
            return KeepaliveAction::SendPing;
        }
        KeepaliveAction::None
    }
}
