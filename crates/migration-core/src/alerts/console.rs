//! Plain-text alerts on stdout.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::alerts::channel::{AlertChannel, ChannelError, ChannelKind};
use crate::domain::Alert;

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleChannel;

impl ConsoleChannel {
    pub fn render(alert: &Alert) -> String {
        let mut out = format!(
            "[{}] {} ({})\n  {}\n",
            alert.severity.as_str().to_uppercase(),
            alert.title(),
            alert.timestamp.to_rfc3339(),
            alert.message
        );
        for (key, value) in alert.fields() {
            out.push_str(&format!("  {key}: {value}\n"));
        }
        out
    }
}

#[async_trait]
impl AlertChannel for ConsoleChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Console
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), ChannelError> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(Self::render(alert).as_bytes()).await?;
        stdout.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AlertType, Severity};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_render_includes_every_field() {
        let alert = Alert::new(
            AlertType::MigrationStalled,
            Severity::High,
            "No progress for 35 minutes",
        )
        .with_data("migrated", 41)
        .with_data("org", "acme")
        .at(Utc.with_ymd_and_hms(2026, 5, 4, 3, 2, 1).unwrap());

        assert_eq!(
            ConsoleChannel::render(&alert),
            "[HIGH] Migration Stalled (2026-05-04T03:02:01+00:00)\n  No progress for 35 minutes\n  migrated: 41\n  org: acme\n"
        );
    }
}
