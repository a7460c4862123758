//! The innermost-first replacement loop and the data portal executor.

use super::Run;
use crate::config::MissingTemplate;
use crate::context::SessionContext;
use crate::error::{DataLinkError, LinkFailure, ResolveError};
use crate::events::ResolverEvent;
use crate::syntax::{DataPortal, Fragment, Portal, Template};
use futures::future::BoxFuture;
use tracing::{debug, warn};

impl<'r, 'a> Run<'r, 'a> {
    /// Resolve every portal in `template`, leftmost innermost first.
    ///
    /// A soft failure empties its span and the loop continues; anything else
    /// aborts. Boxed because nested portal values recurse back here.
    pub(super) fn resolve_template<'s>(
        &'s mut self,
        ctx: &'s mut SessionContext,
        mut template: Template,
    ) -> BoxFuture<'s, Result<String, ResolveError>> {
        Box::pin(async move {
            while let Some(span) = template.innermost() {
                let portal = template.span_text(span);
                self.emit(ResolverEvent::PortalStarted {
                    portal: portal.clone(),
                });
                match self.execute_portal(ctx, &template.body(span)).await {
                    Ok(text) => {
                        self.emit(ResolverEvent::PortalSucceeded {
                            portal,
                            chars: text.chars().count(),
                        });
                        template.splice(span, text);
                    }
                    Err(ResolveError::DataLink(err)) => {
                        self.emit(ResolverEvent::PortalFailed {
                            portal,
                            error: err.to_string(),
                        });
                        template.splice(span, String::new());
                    }
                    Err(err) => {
                        self.emit(ResolverEvent::PortalFailed {
                            portal,
                            error: err.to_string(),
                        });
                        return Err(err);
                    }
                }
            }
            Ok(template.render())
        })
    }

    async fn execute_portal(
        &mut self,
        ctx: &mut SessionContext,
        body: &Fragment,
    ) -> Result<String, ResolveError> {
        match Portal::parse(body)? {
            Portal::Data(portal) => self.execute_data(ctx, &portal).await,
            Portal::Action(portal) => self.execute_action(ctx, &portal).await,
        }
    }

    /// Expand a template with resolved parameters.
    ///
    /// Every parameter is resolved even after one fails, so a single pass
    /// reports all of a portal's broken links.
    async fn execute_data(
        &mut self,
        ctx: &mut SessionContext,
        portal: &DataPortal,
    ) -> Result<String, ResolveError> {
        let token = template_token(&portal.id);
        if let Some(text) = self.template_overrides.get(&token) {
            debug!("Template {token} overridden, parameters skipped");
            return Ok(text.clone());
        }

        let mut values = Vec::with_capacity(portal.params.len());
        let mut first_failure = None;
        for (key, raw) in portal.params.iter() {
            match self.resolve_value(ctx, raw).await {
                Ok(value) => values.push((key.to_string(), value)),
                Err(ResolveError::DataLink(err)) => {
                    first_failure.get_or_insert(err);
                }
                Err(err) => return Err(err),
            }
        }
        if let Some(err) = first_failure {
            return Err(ResolveError::DataLink(err));
        }

        let Some(template) = self.resolver.store.template(&portal.id).await else {
            return match self.config().missing_template {
                MissingTemplate::Error => Err(self.record(DataLinkError::new(
                    token,
                    LinkFailure::MissingTemplate {
                        id: portal.id.clone(),
                    },
                ))),
                MissingTemplate::Empty => {
                    warn!("Prompt template '{}' not found, expanding to nothing", portal.id);
                    Ok(String::new())
                }
            };
        };
        debug!("Expanding '{}' with {} parameter(s)", portal.id, values.len());
        Ok(fill_placeholders(&template.body, &values))
    }
}

/// Aggregate token for a missing template.
fn template_token(id: &str) -> String {
    format!("'{id}'")
}

/// Whether an override key names a template rather than a link.
pub(super) fn is_template_token(key: &str) -> bool {
    key.len() >= 2 && key.starts_with('\'') && key.ends_with('\'')
}

/// Replace every exact `{{key}}` in `body` whose key is in `values`.
/// Unknown placeholders are left as written; inserted values are not
/// rescanned.
pub fn fill_placeholders(body: &str, values: &[(String, String)]) -> String {
    let lookup = |key: &str| values.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());
    let mut out = String::with_capacity(body.len());
    let mut rest = body;
    while let Some(start) = rest.find("{{") {
        let (before, after) = rest.split_at(start);
        out.push_str(before);
        let inner = after.get(2..).unwrap_or_default();
        let Some(end) = inner.find("}}") else {
            out.push_str(after);
            rest = "";
            break;
        };
        let (key, tail) = inner.split_at(end);
        match lookup(key) {
            Some(value) => {
                out.push_str(value);
                rest = tail.get(2..).unwrap_or_default();
            }
            None => {
                out.push_str("{{");
                rest = inner;
            }
        }
    }
    out.push_str(rest);
    out
}
