//! Alert Dispatcher and delivery channels.
//!
//! Provides:
//! - [`dispatcher::AlertDispatcher`]: severity filter, quiet hours, dedup, fan-out
//! - [`channel::AlertChannel`]: one delivery target per [`channel::ChannelKind`]
//! - [`console`], [`chat`], [`email`]: the console, Slack/Teams webhook and SMTP channels

pub mod channel;
pub mod chat;
pub mod console;
pub mod dispatcher;
pub mod email;
pub mod quiet_hours;

pub use channel::{AlertChannel, ChannelError, ChannelKind};
pub use chat::{SlackChannel, TeamsChannel};
pub use console::ConsoleChannel;
pub use dispatcher::{
    AlertDispatcher, DispatchOutcome, DispatcherConfig, DispatcherStats, SuppressionReason,
};
pub use email::{EmailChannel, MailTransport, SmtpMailTransport};
pub use quiet_hours::QuietHours;
