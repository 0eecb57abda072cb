use crate::error::SettlementError;
use crate::types::{Actor, Production, ProductionStatus};
use chrono::{DateTime, Utc};

/// Apply a validation transition to a production record.
///
/// Any state may move to any other state, with two gates:
/// - a production currently `aprobado` may only be moved by an actor with
///   elevated capability;
/// - moving to `rechazado` requires a non-blank comment.
///
/// On success the record's status, comment, validator identity, and
/// validation timestamp are overwritten. On failure the record is left
/// untouched.
pub fn apply_transition(
    production: &mut Production,
    new_status: ProductionStatus,
    comment: Option<&str>,
    actor: &Actor,
    at: DateTime<Utc>,
) -> Result<(), SettlementError> {
    if production.status.is_approved() && !actor.role.has_elevated_capability() {
        return Err(SettlementError::forbidden_for_role(
            actor.role.name(),
            production.status.name(),
        ));
    }

    let comment = comment.map(str::trim).filter(|text| !text.is_empty());
    if new_status == ProductionStatus::Rechazado && comment.is_none() {
        return Err(SettlementError::Validation(
            "rejection requires a comment".to_string(),
        ));
    }

    production.status = new_status;
    production.comment = comment.map(str::to_string);
    production.validated_by = Some(actor.actor_id.clone());
    production.validated_at = Some(at);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::Period;
    use crate::types::ActorRole;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn production(status: ProductionStatus) -> Production {
        Production {
            production_id: Uuid::new_v4().to_string(),
            operator_key: "transportes sur".to_string(),
            operator_display: "Transportes Sur".to_string(),
            period: "1072024".parse::<Period>().unwrap(),
            trips_matched: 4,
            trips_unmatched: 1,
            revenue_minor: 500_000,
            ganancia_minor: 100_000,
            status,
            comment: None,
            validated_by: None,
            validated_at: None,
            computed_at: stamp(),
        }
    }

    fn stamp() -> DateTime<Utc> {
        Utc.timestamp_opt(1_736_000_000, 0).single().unwrap()
    }

    fn validador() -> Actor {
        Actor::new("v-1", ActorRole::Validador)
    }

    fn administrador() -> Actor {
        Actor::new("a-1", ActorRole::Administrador)
    }

    #[test]
    fn validator_moves_pending_to_approved() {
        let mut record = production(ProductionStatus::Pendiente);
        apply_transition(
            &mut record,
            ProductionStatus::Aprobado,
            Some("revisado"),
            &validador(),
            stamp(),
        )
        .unwrap();

        assert_eq!(record.status, ProductionStatus::Aprobado);
        assert_eq!(record.comment.as_deref(), Some("revisado"));
        assert_eq!(record.validated_by.as_deref(), Some("v-1"));
        assert_eq!(record.validated_at, Some(stamp()));
    }

    #[test]
    fn validator_cannot_move_approved_record() {
        let mut record = production(ProductionStatus::Aprobado);
        let err = apply_transition(
            &mut record,
            ProductionStatus::EnRevision,
            None,
            &validador(),
            stamp(),
        )
        .unwrap_err();

        assert!(matches!(err, SettlementError::Forbidden(_)));
        assert_eq!(record.status, ProductionStatus::Aprobado);
        assert!(record.validated_by.is_none());
    }

    #[test]
    fn administrator_reopens_approved_record() {
        let mut record = production(ProductionStatus::Aprobado);
        apply_transition(
            &mut record,
            ProductionStatus::EnRevision,
            Some("re-auditar"),
            &administrador(),
            stamp(),
        )
        .unwrap();

        assert_eq!(record.status, ProductionStatus::EnRevision);
    }

    #[test]
    fn rejection_requires_comment() {
        let mut record = production(ProductionStatus::EnRevision);
        for empty in [None, Some(""), Some("   ")] {
            let err = apply_transition(
                &mut record,
                ProductionStatus::Rechazado,
                empty,
                &validador(),
                stamp(),
            )
            .unwrap_err();
            assert!(matches!(err, SettlementError::Validation(_)));
            assert_eq!(record.status, ProductionStatus::EnRevision);
        }

        apply_transition(
            &mut record,
            ProductionStatus::Rechazado,
            Some("kilometraje inconsistente"),
            &validador(),
            stamp(),
        )
        .unwrap();
        assert_eq!(record.status, ProductionStatus::Rechazado);
    }

    #[test]
    fn transition_overwrites_prior_stamp_and_comment() {
        let mut record = production(ProductionStatus::Pendiente);
        apply_transition(
            &mut record,
            ProductionStatus::EnRevision,
            Some("primera pasada"),
            &validador(),
            stamp(),
        )
        .unwrap();

        let later = stamp() + chrono::Duration::hours(2);
        apply_transition(
            &mut record,
            ProductionStatus::Aprobado,
            None,
            &administrador(),
            later,
        )
        .unwrap();

        assert_eq!(record.comment, None);
        assert_eq!(record.validated_by.as_deref(), Some("a-1"));
        assert_eq!(record.validated_at, Some(later));
    }
}
