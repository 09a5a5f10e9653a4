use super::context::AppContext;
use super::prompts::{parse_rating, select_rating};
use super::sync_ui::is_interactive;
use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use scrobble_core::{ActionError, ActionKind, ActionRunner, MenuAction, RatingChoice, SyncError};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub async fn run_action(
    action: &str,
    media_type: &str,
    dbid: u64,
    rating: Option<u8>,
    output: &Output,
) -> Result<()> {
    let action = MenuAction::parse(action, media_type, dbid).map_err(|e| eyre!("{}", e))?;
    let preset = rating.map(parse_rating).transpose()?;

    let ctx = AppContext::load()?;
    let engine = Arc::new(ctx.engine(CancellationToken::new())?);
    let runner = ActionRunner::new(ctx.api.clone(), ctx.library.clone(), engine);

    let choice = match (action.kind, preset) {
        (ActionKind::Rate, Some(choice)) => Some(choice),
        (ActionKind::Rate, None) => match pick_rating(&runner, &action, output).await? {
            Some(choice) => Some(choice),
            None => {
                output.info("Rating cancelled");
                return Ok(());
            }
        },
        _ => None,
    };

    match runner.run(&action, choice).await {
        Ok(outcome) => {
            if output.is_human() {
                if outcome.changed {
                    output.success(&outcome.message);
                } else {
                    output.info(&outcome.message);
                }
            } else {
                output.data(
                    "action",
                    &json!({
                        "action": action.kind.as_str(),
                        "media_type": action.media_type,
                        "dbid": action.dbid,
                        "changed": outcome.changed,
                        "message": outcome.message,
                    }),
                );
            }
            Ok(())
        }
        Err(ActionError::Sync(SyncError::Unauthorized)) | Err(ActionError::Api(scrobble_api::ApiError::Unauthorized)) => {
            Err(eyre!("SIMKL rejected the access token. Run 'scrobbler auth' again."))
        }
        Err(e) => Err(eyre!("{} failed: {}", action.kind, e)),
    }
}

async fn pick_rating(runner: &ActionRunner, action: &MenuAction, output: &Output) -> Result<Option<RatingChoice>> {
    if !is_interactive() || !output.is_human() {
        return Err(eyre!("{}; pass --rating 1-10 (0 removes the rating)", ActionError::RatingRequired));
    }
    let entry = runner.lookup(action).await.map_err(|e| eyre!("{}", e))?;
    select_rating(&entry.identity.display_title())
}
