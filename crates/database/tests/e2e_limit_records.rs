// Integration tests for the Postgres limit store; skipped unless TEST_DATABASE_URL is set
use std::sync::Arc;

use config::{LimitsConfig, ParameterValue, ParametersConfig};
use database::mock::create_test_database;
use database::Database;
use services::limits::{
    resource_types_for, CheckOutcome, CountableEntity, LimitError, LimitRepository,
    LimitService, LimitSynchronizer, NewLimitRecord, LIMITS_NAMESPACE,
};
use services::metrics::NoopMetricsService;
use services::principals::{PrincipalKind, UserRole};
use services::settings::StaticSettingsService;
use uuid::Uuid;

macro_rules! require_database {
    () => {
        match create_test_database().await.expect("test database setup failed") {
            Some(db) => db,
            None => {
                println!("TEST_DATABASE_URL not set, skipping");
                return;
            }
        }
    };
}

fn parameters(default_max: i64) -> ParametersConfig {
    let mut params = ParametersConfig::default();
    params.set(LIMITS_NAMESPACE, "enable_admin_limits", ParameterValue::Bool(true));
    params.set(LIMITS_NAMESPACE, "enable_domain_limits", ParameterValue::Bool(true));
    for kind in [PrincipalKind::User, PrincipalKind::Domain] {
        for template in resource_types_for(kind) {
            params.set(
                LIMITS_NAMESPACE,
                template.default_parameter_key,
                ParameterValue::Int(default_max),
            );
        }
    }
    params
}

fn synchronizer(db: &Database, params: ParametersConfig) -> LimitSynchronizer {
    LimitSynchronizer::new(
        Arc::new(db.limits.clone()),
        Arc::new(StaticSettingsService::new(params)),
        Arc::new(NoopMetricsService),
    )
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}.test", Uuid::new_v4())
}

#[tokio::test]
async fn test_domain_creation_writes_every_template() {
    let db = require_database!();
    let domain = db.principals.create_domain(&unique("dom")).await.unwrap();

    let created = synchronizer(&db, parameters(3))
        .on_domain_created(&domain)
        .await
        .unwrap();

    assert_eq!(created.len(), resource_types_for(PrincipalKind::Domain).len());
    let stored = db
        .limits
        .list_for_principal(domain.principal_ref())
        .await
        .unwrap();
    assert_eq!(stored.len(), created.len());
    assert!(stored.iter().all(|r| r.max_value == 3));
}

#[tokio::test]
async fn test_failed_batch_leaves_no_records() {
    let db = require_database!();
    let domain = db.principals.create_domain(&unique("dup")).await.unwrap();
    let owner = domain.principal_ref();
    let record = NewLimitRecord {
        principal: owner,
        resource_type: "mailboxes".to_string(),
        entity_type: CountableEntity::Mailbox,
        max_value: 1,
    };

    let result = LimitRepository::create_many(&db.limits, vec![record.clone(), record]).await;

    assert!(result.is_err());
    assert!(db.limits.list_for_principal(owner).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_max_value_below_unlimited_is_rejected_by_schema() {
    let db = require_database!();
    let domain = db.principals.create_domain(&unique("chk")).await.unwrap();

    let result = db
        .limits
        .create_many(&[NewLimitRecord {
            principal: domain.principal_ref(),
            resource_type: "mailboxes".to_string(),
            entity_type: CountableEntity::Mailbox,
            max_value: -2,
        }])
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_check_uses_live_owned_count() {
    let db = require_database!();
    let reseller = db
        .principals
        .create_user(&unique("reseller"), UserRole::Resellers)
        .await
        .unwrap();
    let mut params = parameters(0);
    params.set(
        LIMITS_NAMESPACE,
        "deflt_user_mailboxes_limit",
        ParameterValue::Int(2),
    );
    let settings = Arc::new(StaticSettingsService::new(params));
    let repository = Arc::new(db.limits.clone());
    LimitSynchronizer::new(repository.clone(), settings.clone(), Arc::new(NoopMetricsService))
        .on_user_created(&reseller, None)
        .await
        .unwrap();
    let service = LimitService::new(
        repository,
        settings,
        Arc::new(NoopMetricsService),
        &LimitsConfig::default(),
    );
    let owner = reseller.principal_ref();

    for _ in 0..2 {
        db.limits
            .record_owned_object(owner, CountableEntity::Mailbox, Uuid::new_v4())
            .await
            .unwrap();
    }

    let err = service
        .ensure_allowed(&reseller, "mailboxes", 1)
        .await
        .unwrap_err();
    assert!(matches!(err, LimitError::LimitExceeded(ref e) if e.current_value == 2));
}

#[tokio::test]
async fn test_concurrent_reservations_never_overshoot() {
    let db = Arc::new(require_database!());
    let domain = db.principals.create_domain(&unique("race")).await.unwrap();
    let owner = domain.principal_ref();
    let mut params = parameters(0);
    params.set(
        LIMITS_NAMESPACE,
        "deflt_domain_mailboxes_limit",
        ParameterValue::Int(3),
    );
    synchronizer(&db, params)
        .on_domain_created(&domain)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            db.limits
                .reserve_owned_object(owner, "mailboxes", Uuid::new_v4())
                .await
                .unwrap()
        }));
    }

    let mut allowed = 0;
    for handle in handles {
        if handle.await.unwrap() == Some(CheckOutcome::Allowed) {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 3);
    assert_eq!(
        db.limits
            .count_owned(owner, CountableEntity::Mailbox)
            .await
            .unwrap(),
        3
    );
}

#[tokio::test]
async fn test_deleting_principal_cascades_to_records() {
    let db = require_database!();
    let admin = db
        .principals
        .create_user(&unique("admin"), UserRole::DomainAdmins)
        .await
        .unwrap();
    synchronizer(&db, parameters(1))
        .on_user_created(&admin, None)
        .await
        .unwrap();
    let owner = admin.principal_ref();
    assert!(!db.limits.list_for_principal(owner).await.unwrap().is_empty());

    assert!(db
        .principals
        .delete(PrincipalKind::User, admin.id.0)
        .await
        .unwrap());

    assert!(db.limits.list_for_principal(owner).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_backfill_fills_gaps_only() {
    let db = require_database!();
    let domain = db.principals.create_domain(&unique("gap")).await.unwrap();
    let owner = domain.principal_ref();
    db.limits
        .create_many(&[NewLimitRecord {
            principal: owner,
            resource_type: "mailboxes".to_string(),
            entity_type: CountableEntity::Mailbox,
            max_value: 40,
        }])
        .await
        .unwrap();

    let created = synchronizer(&db, parameters(5))
        .backfill(owner)
        .await
        .unwrap();

    assert_eq!(created.len(), resource_types_for(PrincipalKind::Domain).len() - 1);
    let mailboxes = db.limits.get(owner, "mailboxes").await.unwrap().unwrap();
    assert_eq!(mailboxes.max_value, 40);
}

#[tokio::test]
async fn test_domain_and_records_commit_together() {
    let db = require_database!();
    let name = unique("atomic");

    let (domain, created) = db
        .principals
        .create_domain_with_limits(&name, &synchronizer(&db, parameters(2)))
        .await
        .unwrap();

    assert_eq!(created.len(), resource_types_for(PrincipalKind::Domain).len());
    assert_eq!(
        db.principals.find_domain_by_name(&name).await.unwrap(),
        Some(domain.clone())
    );
    assert_eq!(
        db.limits
            .list_for_principal(domain.principal_ref())
            .await
            .unwrap()
            .len(),
        created.len()
    );
}

#[tokio::test]
async fn test_missing_default_leaves_no_domain_behind() {
    let db = require_database!();
    let name = unique("nodefault");
    let mut params = parameters(2);
    params
        .0
        .get_mut(LIMITS_NAMESPACE)
        .unwrap()
        .remove("deflt_domain_mailboxes_limit");

    let err = db
        .principals
        .create_domain_with_limits(&name, &synchronizer(&db, params))
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<LimitError>(),
        Some(LimitError::MissingDefaultParameter(k)) if k == "deflt_domain_mailboxes_limit"
    ));
    assert!(db.principals.find_domain_by_name(&name).await.unwrap().is_none());
}

#[tokio::test]
async fn test_user_created_by_restricted_admin_is_stored_at_zero() {
    let db = require_database!();
    let reseller = db
        .principals
        .create_user(&unique("reseller"), UserRole::Resellers)
        .await
        .unwrap();

    let (admin, created) = db
        .principals
        .create_user_with_limits(
            &unique("admin"),
            UserRole::DomainAdmins,
            Some(&reseller),
            &synchronizer(&db, parameters(9)),
        )
        .await
        .unwrap();

    assert_eq!(created.len(), resource_types_for(PrincipalKind::User).len());
    let stored = db
        .limits
        .list_for_principal(admin.principal_ref())
        .await
        .unwrap();
    assert!(stored.iter().all(|r| r.max_value == 0));
}

#[tokio::test]
async fn test_strict_reservation_honours_exemptions() {
    let db = require_database!();
    let settings = Arc::new(StaticSettingsService::new(parameters(0)));
    let repository = Arc::new(db.limits.clone());
    let sync = LimitSynchronizer::new(
        repository.clone(),
        settings.clone(),
        Arc::new(NoopMetricsService),
    );
    let (root, _) = db
        .principals
        .create_user_with_limits(&unique("root"), UserRole::SuperAdmins, None, &sync)
        .await
        .unwrap();
    let (reseller, _) = db
        .principals
        .create_user_with_limits(&unique("reseller"), UserRole::Resellers, None, &sync)
        .await
        .unwrap();
    let service = LimitService::new(
        repository,
        settings,
        Arc::new(NoopMetricsService),
        &LimitsConfig::default(),
    );

    // Both have a maximum of zero; only the superuser gets through
    let outcome = service
        .reserve(&root, "domains", Uuid::new_v4())
        .await
        .unwrap();
    assert_eq!(outcome, CheckOutcome::Allowed);
    let outcome = service
        .reserve(&reseller, "domains", Uuid::new_v4())
        .await
        .unwrap();
    assert!(!outcome.is_allowed());

    assert_eq!(
        db.limits
            .count_owned(root.principal_ref(), CountableEntity::Domain)
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        db.limits
            .count_owned(reseller.principal_ref(), CountableEntity::Domain)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_strict_reservation_without_record_is_drift() {
    let db = require_database!();
    let domain = db.principals.create_domain(&unique("drift")).await.unwrap();
    let service = LimitService::new(
        Arc::new(db.limits.clone()),
        Arc::new(StaticSettingsService::new(parameters(1))),
        Arc::new(NoopMetricsService),
        &LimitsConfig::default(),
    );

    let err = service
        .reserve(&domain, "mailboxes", Uuid::new_v4())
        .await
        .unwrap_err();

    assert!(matches!(err, LimitError::MissingLimitRecord { .. }));
}
