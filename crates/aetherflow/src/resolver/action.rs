//! Action portals: side effects on turns of the live conversation.

use super::Run;
use crate::context::SessionContext;
use crate::error::{ActionError, ResolveError, SyntaxError};
use crate::events::ResolverEvent;
use crate::surface::ActionRequest;
use crate::syntax::{ActionKind, ActionPortal};
use crate::{LAST_ACTION_STATUS, STATUS_FAILED, STATUS_SUCCESS};
use tracing::info;

impl Run<'_, '_> {
    /// Run an action portal. Produces no text.
    ///
    /// [`LAST_ACTION_STATUS`] is written before returning either way. Every
    /// failure is hard: the action may already have changed the page.
    pub(super) async fn execute_action(
        &mut self,
        ctx: &mut SessionContext,
        portal: &ActionPortal,
    ) -> Result<String, ResolveError> {
        let target = portal.target_label();
        let action = portal.action.name().to_string();
        self.emit(ResolverEvent::ActionStarted {
            target: target.clone(),
            action: action.clone(),
        });

        match self.run_action(ctx, portal).await {
            Ok(()) => {
                ctx.set_var(LAST_ACTION_STATUS, STATUS_SUCCESS);
                info!("Action {action} on {target} complete");
                self.emit(ResolverEvent::ActionSucceeded { target, action });
                Ok(String::new())
            }
            Err(err) => {
                ctx.set_var(LAST_ACTION_STATUS, STATUS_FAILED);
                self.emit(ResolverEvent::ActionFailed {
                    target,
                    action,
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn run_action(
        &mut self,
        ctx: &mut SessionContext,
        portal: &ActionPortal,
    ) -> Result<(), ResolveError> {
        let target = portal.target_label();
        let fail = |reason: String| ActionError {
            target: target.clone(),
            action: portal.action.name().to_string(),
            reason,
        };

        if let ActionKind::Unknown(name) = &portal.action {
            return Err(SyntaxError::new(
                format!("unknown action '{name}'"),
                format!("@{target}:{name}"),
            )
            .into());
        }
        if portal.conduit.is_some() {
            return Err(fail("target not found: actions apply only to the live conversation".into()).into());
        }

        let mut params = Vec::with_capacity(portal.params.len() + 1);
        for (key, raw) in portal.params.iter() {
            match self.resolve_value(ctx, raw).await {
                Ok(value) => params.push((key.to_string(), value)),
                Err(ResolveError::DataLink(err)) => {
                    return Err(fail(format!("parameter '{key}' unresolved: {err}")).into());
                }
                Err(err) => return Err(err),
            }
        }
        let request = build_request(&portal.action, params).map_err(fail)?;

        let surface = self.resolver.surface;
        let handle = surface
            .find_turn(portal.target)
            .await
            .ok_or_else(|| fail("target not found".into()))?;
        surface
            .perform_action(&handle, &request)
            .await
            .map_err(fail)?;

        let settle = self.config().settle_delay;
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }
        Ok(())
    }
}

/// Validate parameters for `action` and fill defaults.
fn build_request(
    action: &ActionKind,
    mut params: Vec<(String, String)>,
) -> Result<ActionRequest, String> {
    match action {
        ActionKind::Edit => {
            let has_text = params
                .iter()
                .any(|(k, v)| k == "new_text" && !v.trim().is_empty());
            if !has_text {
                return Err("edit requires a non-empty new_text".into());
            }
        }
        ActionKind::Copy => {
            if !params.iter().any(|(k, _)| k == "format") {
                params.push(("format".into(), "text".into()));
            }
        }
        _ => {}
    }
    Ok(ActionRequest {
        action: action.name().to_string(),
        params,
    })
}
