use super::core::GovernanceClient;
use super::types::{request_types, Context, GovernedResponse};
use crate::Result;
use serde_json::Value;

/// Fluent builder for a governed query.
///
/// Defaults: empty user token, request type `"chat"`, empty context.
pub struct QueryBuilder<'a> {
    pub(crate) client: &'a GovernanceClient,
    pub(crate) query: String,
    pub(crate) user_token: String,
    pub(crate) request_type: String,
    pub(crate) context: Context,
}

impl<'a> QueryBuilder<'a> {
    pub(crate) fn new(client: &'a GovernanceClient, query: String) -> Self {
        Self {
            client,
            query,
            user_token: String::new(),
            request_type: request_types::CHAT.to_string(),
            context: Context::new(),
        }
    }

    pub fn user_token(mut self, token: impl Into<String>) -> Self {
        self.user_token = token.into();
        self
    }

    pub fn request_type(mut self, request_type: impl Into<String>) -> Self {
        self.request_type = request_type.into();
        self
    }

    /// Replace the whole context map.
    pub fn context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Add a single context entry.
    pub fn context_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub async fn send(self) -> Result<GovernedResponse> {
        self.client
            .execute_query(&self.user_token, &self.query, &self.request_type, self.context)
            .await
    }

    /// Like [`QueryBuilder::send`], but a blocked response becomes a
    /// [`crate::PolicyViolation`] error.
    pub async fn send_enforced(self) -> Result<GovernedResponse> {
        self.send().await?.into_policy_result()
    }
}
