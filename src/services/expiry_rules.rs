//! Expiry rule resolution and management.
//!
//! A rule maps a medicine category to (warning_days, critical_days).
//! Resolution order: active category-specific rule, then the active
//! global rule (`category_id = NULL`), then the built-in default.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use validator::Validate;

use crate::actor::ActorContext;
use crate::db::DbPool;
use crate::entities::expiry_rule;
use crate::errors::ServiceError;

pub const DEFAULT_WARNING_DAYS: i32 = 30;
pub const DEFAULT_CRITICAL_DAYS: i32 = 7;

/// Thresholds applicable to one medicine after resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedExpiryRule {
    pub warning_days: i32,
    pub critical_days: i32,
}

impl Default for ResolvedExpiryRule {
    fn default() -> Self {
        Self {
            warning_days: DEFAULT_WARNING_DAYS,
            critical_days: DEFAULT_CRITICAL_DAYS,
        }
    }
}

/// Urgency classification for a non-expired batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpiryUrgency {
    Critical,
    Warning,
    Normal,
}

impl ResolvedExpiryRule {
    /// Classifies a batch that has not yet expired (`days_until_expiry >= 0`).
    pub fn classify(&self, days_until_expiry: i64) -> ExpiryUrgency {
        if days_until_expiry <= self.critical_days as i64 {
            ExpiryUrgency::Critical
        } else if days_until_expiry <= self.warning_days as i64 {
            ExpiryUrgency::Warning
        } else {
            ExpiryUrgency::Normal
        }
    }
}

/// Resolves the applicable rule for a category from a pre-fetched active
/// rule set.
pub fn resolve(rules: &[expiry_rule::Model], category_id: i64) -> ResolvedExpiryRule {
    let found = rules
        .iter()
        .find(|r| r.category_id == Some(category_id))
        .or_else(|| rules.iter().find(|r| r.category_id.is_none()));

    match found {
        Some(rule) => ResolvedExpiryRule {
            warning_days: rule.warning_days,
            critical_days: rule.critical_days,
        },
        None => ResolvedExpiryRule::default(),
    }
}

/// Fetches all active rules.
pub async fn active_rules<C: ConnectionTrait>(
    conn: &C,
) -> Result<Vec<expiry_rule::Model>, ServiceError> {
    expiry_rule::Entity::find()
        .filter(expiry_rule::Column::IsActive.eq(true))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ExpiryRuleInput {
    pub category_id: Option<i64>,
    #[validate(range(min = 1))]
    pub warning_days: i32,
    #[validate(range(min = 1))]
    pub critical_days: i32,
    pub is_active: bool,
}

/// CRUD surface for expiry rules. Deletion is a soft deactivate so that
/// historical resolution stays explainable.
#[derive(Clone)]
pub struct ExpiryRuleService {
    db: Arc<DbPool>,
}

impl ExpiryRuleService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    pub async fn list(&self) -> Result<Vec<expiry_rule::Model>, ServiceError> {
        expiry_rule::Entity::find()
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn get(&self, id: i64) -> Result<expiry_rule::Model, ServiceError> {
        expiry_rule::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Expiry rule {} not found", id)))
    }

    #[instrument(skip(self, actor))]
    pub async fn create(
        &self,
        input: ExpiryRuleInput,
        actor: &ActorContext,
    ) -> Result<expiry_rule::Model, ServiceError> {
        input.validate()?;
        self.ensure_scope_free(input.category_id, None).await?;

        let rule = expiry_rule::ActiveModel {
            category_id: Set(input.category_id),
            warning_days: Set(input.warning_days),
            critical_days: Set(input.critical_days),
            is_active: Set(input.is_active),
            created_at: Set(Utc::now()),
            created_by: Set(Some(actor.username.clone())),
            ..Default::default()
        };

        rule.insert(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self, actor))]
    pub async fn update(
        &self,
        id: i64,
        input: ExpiryRuleInput,
        actor: &ActorContext,
    ) -> Result<expiry_rule::Model, ServiceError> {
        input.validate()?;
        let rule = self.get(id).await?;

        // Moving scope or reactivating may collide with another active rule.
        if rule.category_id != input.category_id || (input.is_active && !rule.is_active) {
            self.ensure_scope_free(input.category_id, Some(id)).await?;
        }

        let mut active: expiry_rule::ActiveModel = rule.into();
        active.category_id = Set(input.category_id);
        active.warning_days = Set(input.warning_days);
        active.critical_days = Set(input.critical_days);
        active.is_active = Set(input.is_active);
        active.updated_at = Set(Some(Utc::now()));
        active.updated_by = Set(Some(actor.username.clone()));

        active
            .update(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self, actor))]
    pub async fn deactivate(&self, id: i64, actor: &ActorContext) -> Result<(), ServiceError> {
        let rule = self.get(id).await?;

        let mut active: expiry_rule::ActiveModel = rule.into();
        active.is_active = Set(false);
        active.updated_at = Set(Some(Utc::now()));
        active.updated_by = Set(Some(actor.username.clone()));
        active.update(self.db.as_ref()).await?;

        Ok(())
    }

    /// At most one active rule per category and one active global rule.
    async fn ensure_scope_free(
        &self,
        category_id: Option<i64>,
        excluding: Option<i64>,
    ) -> Result<(), ServiceError> {
        let mut query = expiry_rule::Entity::find()
            .filter(expiry_rule::Column::IsActive.eq(true))
            .filter(match category_id {
                Some(id) => expiry_rule::Column::CategoryId.eq(id),
                None => expiry_rule::Column::CategoryId.is_null(),
            });

        if let Some(id) = excluding {
            query = query.filter(expiry_rule::Column::Id.ne(id));
        }

        if query.one(self.db.as_ref()).await?.is_some() {
            return Err(ServiceError::Conflict(match category_id {
                Some(_) => "An active rule for this category already exists".to_string(),
                None => "An active global rule already exists".to_string(),
            }));
        }

        Ok(())
    }
}
