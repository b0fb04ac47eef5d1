/// Background dispatch of due delayed actions.
///
/// Drains the scheduler's due-action channel and re-enters the lifecycle
/// through its public operations only: the auto-unban runs as the system
/// actor, the purge and reminder delivery are the lifecycle's own
/// background entry points.
use crate::{
    account::lifecycle::{AccountLifecycle, ModerationActor},
    metrics,
    scheduler::{DelayedAction, DueAction},
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info};

/// Run until the scheduler side of the channel is dropped
pub async fn run_dispatcher(
    lifecycle: Arc<AccountLifecycle>,
    mut due: UnboundedReceiver<DueAction>,
) {
    info!("Starting delayed action dispatcher");

    while let Some(DueAction { key, action }) = due.recv().await {
        let name = action.as_str();

        let result = match action {
            DelayedAction::Unban { account_id } => lifecycle
                .unban_account(
                    ModerationActor::System,
                    account_id,
                    Some("Ban period elapsed".to_string()),
                )
                .await
                .map(|_| ()),
            DelayedAction::PurgeAccount { account_id } => {
                lifecycle.purge_account(account_id).await
            }
            DelayedAction::ReadingReminder { account_id } => {
                lifecycle.deliver_reading_reminder(account_id).await
            }
        };

        match result {
            Ok(()) => {
                metrics::DELAYED_ACTIONS_TOTAL
                    .with_label_values(&[name, "ok"])
                    .inc();
            }
            Err(e) => {
                metrics::DELAYED_ACTIONS_TOTAL
                    .with_label_values(&[name, "error"])
                    .inc();
                error!("Delayed action {} failed: {}", key.as_str(), e);
            }
        }
    }

    info!("Delayed action dispatcher stopped");
}
