use axum::{
    extract::{Query, State},
    routing::get,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use yatra_booking::{MismatchKind, ReconciliationFilter, ReconciliationReport};
use yatra_core::{Actor, AuditEntityType, AuditFilter, AuditLogEntry, Role};

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct ReconciliationQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Comma-separated mismatch kinds, e.g. `amount_mismatch,refund_not_marked`.
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub entity_type: Option<AuditEntityType>,
    pub entity_id: Option<Uuid>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/reconciliation", get(reconciliation_report))
        .route("/v1/admin/audit", get(audit_trail))
}

fn parse_kinds(raw: Option<&str>) -> Result<Vec<MismatchKind>, AppError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<MismatchKind>().map_err(AppError::ValidationError))
        .collect()
}

/// GET /v1/admin/reconciliation?from=&to=&kind=
async fn reconciliation_report(
    State(state): State<AppState>,
    Query(query): Query<ReconciliationQuery>,
) -> Result<Json<ReconciliationReport>, AppError> {
    let filter = ReconciliationFilter {
        from: query.from,
        to: query.to,
        kinds: parse_kinds(query.kind.as_deref())?,
    };
    let report = state.service.reconciliation_report(&filter).await?;
    Ok(Json(report))
}

/// GET /v1/admin/audit?entity_type=&entity_id=
async fn audit_trail(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditLogEntry>>, AppError> {
    if !actor.has_at_least(Role::Admin) {
        return Err(AppError::AuthorizationError("the audit trail requires admin".to_string()));
    }
    let filter = AuditFilter {
        entity_type: query.entity_type,
        entity_id: query.entity_id,
    };
    Ok(Json(state.service.audit_trail(&filter).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kinds() {
        assert!(parse_kinds(None).unwrap().is_empty());
        assert_eq!(
            parse_kinds(Some("amount_mismatch, refund_not_marked")).unwrap(),
            vec![MismatchKind::AmountMismatch, MismatchKind::RefundNotMarked]
        );
        assert!(matches!(parse_kinds(Some("bogus")), Err(AppError::ValidationError(_))));
    }
}
