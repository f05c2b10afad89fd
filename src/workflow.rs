// Per-message workflow: report -> completion check -> render -> upload -> reply.

use std::sync::Arc;

use chrono::{Local, Utc};
use futures::future::join_all;

use crate::delivery::{ChatRef, ImageHost, ProfileDirectory, Reply};
use crate::error::RenderError;
use crate::map::render::MapRenderer;
use crate::map::teams::TeamAssignments;
use crate::metrics;
use crate::replies::{self, SummaryLine};
use crate::tracker::{Batch, ParticipantTracker, Rejection, Report, ReportOutcome};

/// A validated text message from a chat participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat: ChatRef,
    /// Stable platform user id; batches are keyed by this, never by display name.
    pub participant: String,
    pub text: String,
}

/// Chat commands recognised before station matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Status,
    Reset,
    Help,
}

impl Command {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "/status" | "状況" => Some(Command::Status),
            "/reset" | "リセット" => Some(Command::Reset),
            "/help" | "ヘルプ" => Some(Command::Help),
            _ => None,
        }
    }
}

pub struct Workflow {
    tracker: ParticipantTracker,
    renderer: Arc<MapRenderer>,
    teams: Arc<TeamAssignments>,
    host: Arc<dyn ImageHost>,
    directory: Arc<dyn ProfileDirectory>,
}

impl Workflow {
    pub fn new(
        tracker: ParticipantTracker,
        renderer: Arc<MapRenderer>,
        teams: Arc<TeamAssignments>,
        host: Arc<dyn ImageHost>,
        directory: Arc<dyn ProfileDirectory>,
    ) -> Self {
        Self {
            tracker,
            renderer,
            teams,
            host,
            directory,
        }
    }

    pub fn tracker(&self) -> &ParticipantTracker {
        &self.tracker
    }

    /// Handle one inbound message and produce the reply for its chat.
    pub async fn handle(&self, msg: &InboundMessage) -> Reply {
        let text = msg.text.trim();
        if let Some(command) = Command::parse(text) {
            return self.run_command(command, &msg.chat).await;
        }

        let submission = self.tracker.report(&msg.chat.id, &msg.participant, text);
        metrics::REPORTS_TOTAL
            .with_label_values(&[submission.outcome.label()])
            .inc();

        match (submission.outcome, submission.flushed) {
            (ReportOutcome::Rejected(Rejection::UnknownStation), _) => {
                tracing::debug!(
                    "Ignoring non-station text from {} in {}",
                    msg.participant,
                    msg.chat.id
                );
                Reply::Text(replies::unknown_station(text))
            }
            (_, Some(batch)) => self.flush(&msg.chat, batch).await,
            (outcome, None) => {
                let station = submission.station.unwrap_or_default();
                let name = self.display_name(&msg.chat, &msg.participant).await;
                let required = self.tracker.policy().required_count();
                match outcome {
                    ReportOutcome::Registered(count) => {
                        tracing::info!(
                            "Registered {} at {station} in {} ({count}/{required})",
                            msg.participant,
                            msg.chat.id
                        );
                        Reply::Text(replies::registered(&name, &station, count, required))
                    }
                    ReportOutcome::Updated(count) => {
                        tracing::info!(
                            "Updated {} to {station} in {} ({count}/{required})",
                            msg.participant,
                            msg.chat.id
                        );
                        Reply::Text(replies::updated(&name, &station, count, required))
                    }
                    ReportOutcome::Rejected(rejection) => {
                        tracing::info!(
                            "Rejected report from {} in {}: {rejection}",
                            msg.participant,
                            msg.chat.id
                        );
                        Reply::Text(replies::duplicate(&name, &station))
                    }
                }
            }
        }
    }

    async fn run_command(&self, command: Command, chat: &ChatRef) -> Reply {
        let required = self.tracker.policy().required_count();
        match command {
            Command::Help => Reply::Text(replies::help(required)),
            Command::Reset => {
                if self.tracker.reset(&chat.id) {
                    tracing::info!("Batch for {} reset on request", chat.id);
                    Reply::Text(replies::reset_done())
                } else {
                    Reply::Text(replies::reset_noop())
                }
            }
            Command::Status => {
                let Some(batch) = self.tracker.snapshot(&chat.id) else {
                    return Reply::Text(replies::status_empty(required));
                };
                let names = self.names_for(chat, batch.reports()).await;
                let lines = self.summary_lines(&names, batch.reports());
                let opened_at = batch
                    .opened_at()
                    .map(|t| t.with_timezone(&Local).format("%H:%M").to_string())
                    .unwrap_or_default();
                Reply::Text(replies::status(&lines, required, &opened_at))
            }
        }
    }

    /// Render the flushed batch off the async runtime and deliver it.
    ///
    /// The tracker has already reset the chat; nothing here puts the batch
    /// back, whatever fails.
    async fn flush(&self, chat: &ChatRef, batch: Batch) -> Reply {
        metrics::FLUSHES_TOTAL.inc();
        let reports = batch.into_reports();
        tracing::info!(
            "Batch for {} complete with {} participant(s), rendering",
            chat.id,
            reports.len()
        );

        let names = self.names_for(chat, &reports).await;
        let lines = self.summary_lines(&names, &reports);

        let renderer = Arc::clone(&self.renderer);
        let teams = Arc::clone(&self.teams);
        let snapshot = reports.clone();
        let timer = metrics::RENDER_DURATION_SECONDS.start_timer();
        let rendered = tokio::task::spawn_blocking(move || {
            renderer
                .render(&snapshot, |participant| teams.color_for(participant))?
                .encode_jpeg()
        })
        .await;
        timer.observe_duration();

        let jpeg = match rendered {
            Ok(Ok(jpeg)) => jpeg,
            Ok(Err(RenderError::AssetMissing(reason))) => {
                metrics::RENDER_FAILURES_TOTAL
                    .with_label_values(&["asset_missing"])
                    .inc();
                tracing::error!("Render for {} failed, asset missing: {reason}", chat.id);
                return Reply::Text(replies::asset_missing());
            }
            Ok(Err(e)) => {
                metrics::RENDER_FAILURES_TOTAL
                    .with_label_values(&["encode"])
                    .inc();
                tracing::error!("Render for {} failed: {e}", chat.id);
                return Reply::Text(replies::render_failed());
            }
            Err(e) => {
                metrics::RENDER_FAILURES_TOTAL
                    .with_label_values(&["panicked"])
                    .inc();
                tracing::error!("Render task for {} did not complete: {e}", chat.id);
                return Reply::Text(replies::render_failed());
            }
        };

        let name = format!("tetsuoni_{}.jpeg", Utc::now().format("%Y%m%d%H%M%S"));
        match self.host.upload(jpeg, &name).await {
            Ok(image_url) => Reply::TextWithImage {
                text: replies::flushed(&lines),
                image_url,
            },
            Err(e) => {
                metrics::DELIVERY_FAILURES_TOTAL
                    .with_label_values(&["upload"])
                    .inc();
                tracing::error!("Upload for {} failed: {e}", chat.id);
                Reply::Text(replies::upload_failed(&lines))
            }
        }
    }

    async fn display_name(&self, chat: &ChatRef, user_id: &str) -> String {
        self.directory
            .display_name(chat, user_id)
            .await
            .unwrap_or_else(|| user_id.to_string())
    }

    async fn names_for(&self, chat: &ChatRef, reports: &[Report]) -> Vec<String> {
        join_all(
            reports
                .iter()
                .map(|r| self.display_name(chat, &r.participant)),
        )
        .await
    }

    fn summary_lines<'a>(&'a self, names: &'a [String], reports: &'a [Report]) -> Vec<SummaryLine<'a>> {
        names
            .iter()
            .zip(reports)
            .map(|(name, report)| SummaryLine {
                name,
                station: &report.station,
                team: self.teams.team_of(&report.participant),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parse() {
        assert_eq!(Command::parse("/status"), Some(Command::Status));
        assert_eq!(Command::parse(" 状況 "), Some(Command::Status));
        assert_eq!(Command::parse("リセット"), Some(Command::Reset));
        assert_eq!(Command::parse("/help"), Some(Command::Help));
        assert_eq!(Command::parse("渋谷"), None);
        assert_eq!(Command::parse("/statusx"), None);
    }
}
