//! Evidentiary quotes
//!
//! Quotes are supporting material with their own lifecycle: they can be added,
//! edited or deleted at any workflow stage without holding the record lock.

use casefile_common::time;
use casefile_common::Actor;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::policy::{authorize, Operation};
use super::require_record;
use crate::db::quotes;
use crate::db::RecordRepository;
use crate::error::{WorkflowError, WorkflowResult};
use crate::models::{Quote, RecordId};

#[derive(Debug, Clone, Deserialize)]
pub struct NewQuote {
    pub text: String,
    #[serde(default)]
    pub source_id: Option<i64>,
    #[serde(default)]
    pub field_names: Vec<String>,
}

/// Partial update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuoteUpdate {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub source_id: Option<i64>,
    #[serde(default)]
    pub verified: Option<bool>,
    #[serde(default)]
    pub field_names: Option<Vec<String>>,
}

fn clean_field_names(names: Vec<String>) -> Vec<String> {
    let mut names: Vec<String> = names
        .into_iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();
    names.sort();
    names.dedup();
    names
}

fn require_quote_text(text: &str) -> WorkflowResult<()> {
    if text.trim().is_empty() {
        return Err(WorkflowError::InvalidInput("quote text must not be empty".to_string()));
    }
    Ok(())
}

#[derive(Clone)]
pub struct QuoteBook {
    repo: RecordRepository,
}

impl QuoteBook {
    pub fn new(repo: RecordRepository) -> Self {
        Self { repo }
    }

    pub async fn add(
        &self,
        record_id: RecordId,
        actor: &Actor,
        quote: NewQuote,
    ) -> WorkflowResult<Quote> {
        authorize(actor, Operation::ManageQuotes)?;
        require_quote_text(&quote.text)?;
        require_record(&self.repo, record_id).await?;

        let now = time::now();
        let quote = Quote {
            id: Uuid::new_v4(),
            record_id,
            text: quote.text,
            source_id: quote.source_id,
            verified: false,
            field_names: clean_field_names(quote.field_names),
            created_by: actor.user_id,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.repo.begin().await?;
        quotes::insert_quote(&mut tx, &quote).await?;
        tx.commit().await?;

        info!(record_id, quote_id = %quote.id, actor = actor.user_id, "Quote added");
        Ok(quote)
    }

    pub async fn update(
        &self,
        quote_id: Uuid,
        actor: &Actor,
        update: QuoteUpdate,
    ) -> WorkflowResult<Quote> {
        authorize(actor, Operation::ManageQuotes)?;
        if let Some(text) = &update.text {
            require_quote_text(text)?;
        }

        let mut conn = self.repo.pool().acquire().await?;
        let mut quote = quotes::get_quote(&mut conn, quote_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("Quote", quote_id))?;
        drop(conn);

        if let Some(text) = update.text {
            quote.text = text;
        }
        if let Some(source_id) = update.source_id {
            quote.source_id = Some(source_id);
        }
        if let Some(verified) = update.verified {
            quote.verified = verified;
        }
        if let Some(field_names) = update.field_names {
            quote.field_names = clean_field_names(field_names);
        }
        quote.updated_at = time::now();

        let mut tx = self.repo.begin().await?;
        if !quotes::update_quote(&mut tx, &quote).await? {
            tx.rollback().await?;
            return Err(WorkflowError::not_found("Quote", quote_id));
        }
        tx.commit().await?;

        info!(
            record_id = quote.record_id,
            %quote_id,
            actor = actor.user_id,
            verified = quote.verified,
            "Quote updated"
        );
        Ok(quote)
    }

    pub async fn delete(&self, quote_id: Uuid, actor: &Actor) -> WorkflowResult<()> {
        authorize(actor, Operation::ManageQuotes)?;

        let mut conn = self.repo.pool().acquire().await?;
        if !quotes::delete_quote(&mut conn, quote_id).await? {
            return Err(WorkflowError::not_found("Quote", quote_id));
        }

        info!(%quote_id, actor = actor.user_id, "Quote deleted");
        Ok(())
    }

    /// Quotes on a record, optionally only those linked to one field
    pub async fn list(
        &self,
        record_id: RecordId,
        actor: &Actor,
        field_name: Option<&str>,
    ) -> WorkflowResult<Vec<Quote>> {
        authorize(actor, Operation::ViewQuotes)?;
        require_record(&self.repo, record_id).await?;
        Ok(quotes::list_quotes(self.repo.pool(), record_id, field_name).await?)
    }
}
