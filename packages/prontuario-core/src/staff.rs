//! Administração de funcionários
//!
//! CRUD de identidades STAFF dentro de uma clínica, restrito a
//! administradores. A criação é adicionalmente sujeita ao limite de
//! funcionários do plano vigente. O campo de credencial nunca aparece nas
//! respostas; a desativação é o único mecanismo de revogação de acesso (não
//! há exclusão física de funcionários).

use crate::authorize::{self, check_staff_capacity, Decision, CLINIC_ADMIN, STAFF_CREATE};
use crate::crypto::{self, HashParams};
use crate::error::{FieldError, ServiceError};
use crate::identity::Caller;
use crate::plans;
use prontuario_db::models::{PermissionSet, StaffSummary, User};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

/// Dados para cadastro de um funcionário
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStaff {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub department: Option<String>,
    pub position: Option<String>,
    /// Capacidades concedidas; deve estar presente (pode ser lista vazia)
    pub permissions: Option<Vec<String>>,
}

/// Atualização parcial de um funcionário
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffPatch {
    pub email: Option<String>,
    /// Nova senha; será re-hasheada antes do armazenamento
    pub password: Option<String>,
    pub full_name: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub permissions: Option<Vec<String>>,
}

fn validate_new(data: &NewStaff) -> Result<(), ServiceError> {
    let mut errors = Vec::new();
    if !validator::validate_email(&data.email) {
        errors.push(FieldError::new("email", "Informe um e-mail válido"));
    }
    errors.extend(crypto::password_policy_errors(&data.password));
    if data.full_name.trim().is_empty() {
        errors.push(FieldError::new("fullName", "Nome completo é obrigatório"));
    }
    if data.permissions.is_none() {
        errors.push(FieldError::new("permissions", "Permissões devem ser informadas como lista"));
    }
    ServiceError::from_fields(errors)
}

fn validate_patch(patch: &StaffPatch) -> Result<(), ServiceError> {
    let mut errors = Vec::new();
    if let Some(email) = &patch.email {
        if !validator::validate_email(email) {
            errors.push(FieldError::new("email", "Informe um e-mail válido"));
        }
    }
    if let Some(password) = &patch.password {
        errors.extend(crypto::password_policy_errors(password));
    }
    if let Some(full_name) = &patch.full_name {
        if full_name.trim().is_empty() {
            errors.push(FieldError::new("fullName", "Nome completo é obrigatório"));
        }
    }
    ServiceError::from_fields(errors)
}

/// Funcionário STAFF no escopo da clínica
async fn find_scoped(
    pool: &SqlitePool,
    staff_id: Uuid,
    clinic_id: Uuid,
) -> Result<User, ServiceError> {
    let user: Option<User> = sqlx::query_as(
        "SELECT * FROM users WHERE id = ? AND clinic_id = ? AND role = 'staff'",
    )
    .bind(staff_id)
    .bind(clinic_id)
    .fetch_optional(pool)
    .await?;

    user.ok_or_else(|| ServiceError::NotFound("Funcionário".to_string()))
}

/// Número de funcionários ativos da clínica
async fn active_staff_count(pool: &SqlitePool, clinic_id: Uuid) -> Result<u32, ServiceError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM users WHERE clinic_id = ? AND role = 'staff' AND is_active = 1",
    )
    .bind(clinic_id)
    .fetch_one(pool)
    .await?;
    Ok(count as u32)
}

/// Lista os funcionários da clínica, por nome completo
pub async fn list(
    pool: &SqlitePool,
    caller: &Caller,
    clinic_id: Uuid,
) -> Result<Vec<StaffSummary>, ServiceError> {
    authorize::guard(pool, caller, &CLINIC_ADMIN, clinic_id).await?;

    let users: Vec<User> = sqlx::query_as(
        "SELECT * FROM users WHERE clinic_id = ? AND role = 'staff' ORDER BY full_name ASC",
    )
    .bind(clinic_id)
    .fetch_all(pool)
    .await?;

    Ok(users.into_iter().map(StaffSummary::from).collect())
}

/// Cadastra um funcionário na clínica
///
/// Exige plano Starter ou superior e respeita o limite de funcionários do plano
/// vigente; o e-mail é único em toda a plataforma.
pub async fn create(
    pool: &SqlitePool,
    caller: &Caller,
    clinic_id: Uuid,
    data: NewStaff,
) -> Result<StaffSummary, ServiceError> {
    authorize::guard(pool, caller, &STAFF_CREATE, clinic_id).await?;
    validate_new(&data)?;

    // Checagem secundária de capacidade do plano
    let tier = plans::current_tier(pool, clinic_id).await?;
    if let Decision::Deny(_) = check_staff_capacity(tier, active_staff_count(pool, clinic_id).await?)
    {
        return Err(ServiceError::CapacityExceeded(format!(
            "o plano {} não permite mais funcionários ativos",
            tier
        )));
    }

    // Checagem prévia de duplicidade; a restrição UNIQUE do banco cobre a
    // corrida entre a consulta e a inserção
    let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(&data.email)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Err(ServiceError::Conflict(
            "Este e-mail já está cadastrado".to_string(),
        ));
    }

    let id = Uuid::new_v4();
    let password_hash = crypto::hash_password(&data.password, HashParams::default())?;
    let permissions = PermissionSet::Granted {
        capabilities: data.permissions.unwrap_or_default(),
    };

    sqlx::query(
        "INSERT INTO users (id, email, password_hash, full_name, role, permissions, \
         department, position, clinic_id) VALUES (?, ?, ?, ?, 'staff', ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(&data.email)
    .bind(&password_hash)
    .bind(&data.full_name)
    .bind(serde_json::to_string(&permissions).map_err(|e| ServiceError::Upstream(e.into()))?)
    .bind(&data.department)
    .bind(&data.position)
    .bind(clinic_id)
    .execute(pool)
    .await?;

    info!(staff_id = %id, clinic_id = %clinic_id, "Funcionário cadastrado");
    Ok(StaffSummary::from(find_scoped(pool, id, clinic_id).await?))
}

/// Atualiza parcialmente um funcionário
pub async fn update(
    pool: &SqlitePool,
    caller: &Caller,
    staff_id: Uuid,
    clinic_id: Uuid,
    patch: StaffPatch,
) -> Result<StaffSummary, ServiceError> {
    authorize::guard(pool, caller, &CLINIC_ADMIN, clinic_id).await?;
    validate_patch(&patch)?;
    find_scoped(pool, staff_id, clinic_id).await?;

    // Senha nova é re-hasheada antes de chegar ao banco
    let password_hash = match &patch.password {
        Some(password) => Some(crypto::hash_password(password, HashParams::default())?),
        None => None,
    };
    let permissions = match patch.permissions {
        Some(capabilities) => Some(
            serde_json::to_string(&PermissionSet::Granted { capabilities })
                .map_err(|e| ServiceError::Upstream(e.into()))?,
        ),
        None => None,
    };

    sqlx::query(
        "UPDATE users SET \
            email = COALESCE(?, email), \
            password_hash = COALESCE(?, password_hash), \
            full_name = COALESCE(?, full_name), \
            department = COALESCE(?, department), \
            position = COALESCE(?, position), \
            permissions = COALESCE(?, permissions), \
            updated_at = CURRENT_TIMESTAMP \
         WHERE id = ? AND clinic_id = ? AND role = 'staff'",
    )
    .bind(patch.email)
    .bind(password_hash)
    .bind(patch.full_name)
    .bind(patch.department)
    .bind(patch.position)
    .bind(permissions)
    .bind(staff_id)
    .bind(clinic_id)
    .execute(pool)
    .await?;

    Ok(StaffSummary::from(find_scoped(pool, staff_id, clinic_id).await?))
}

/// Alterna o estado ativo de um funcionário
pub async fn toggle_active(
    pool: &SqlitePool,
    caller: &Caller,
    staff_id: Uuid,
    clinic_id: Uuid,
) -> Result<StaffSummary, ServiceError> {
    authorize::guard(pool, caller, &CLINIC_ADMIN, clinic_id).await?;
    find_scoped(pool, staff_id, clinic_id).await?;

    sqlx::query(
        "UPDATE users SET is_active = NOT is_active, updated_at = CURRENT_TIMESTAMP \
         WHERE id = ? AND clinic_id = ? AND role = 'staff'",
    )
    .bind(staff_id)
    .bind(clinic_id)
    .execute(pool)
    .await?;

    let updated = find_scoped(pool, staff_id, clinic_id).await?;
    info!(staff_id = %staff_id, is_active = updated.is_active, "Estado do funcionário alternado");
    Ok(StaffSummary::from(updated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use crate::DenyReason;
    use prontuario_db::models::UserRole;

    fn new_staff(email: &str, name: &str) -> NewStaff {
        NewStaff {
            email: email.to_string(),
            password: "Senha-forte1!".to_string(),
            full_name: name.to_string(),
            department: Some("Fisioterapia".to_string()),
            position: None,
            permissions: Some(vec!["patients:read".to_string()]),
        }
    }

    #[tokio::test]
    async fn test_create_requires_starter_plan() {
        let pool = test_support::pool().await;
        let clinic = test_support::seed_clinic(&pool, "Clínica A").await;
        let admin = test_support::seed_user(&pool, clinic, UserRole::Admin, "adm@a.com").await;

        // Plano free (nível 0) não alcança o nível Starter exigido
        let result = create(&pool, &admin, clinic, new_staff("s@a.com", "Sofia")).await;
        assert!(matches!(
            result,
            Err(ServiceError::Authorization(DenyReason::PlanInsufficient))
        ));

        // Após o upgrade a mesma chamada passa
        test_support::set_plan(&pool, clinic, "starter").await;
        let staff = create(&pool, &admin, clinic, new_staff("s@a.com", "Sofia"))
            .await
            .unwrap();
        assert_eq!(staff.full_name, "Sofia");
    }

    #[tokio::test]
    async fn test_capacity_limit_and_reactivation() {
        let pool = test_support::pool().await;
        let clinic = test_support::seed_clinic(&pool, "Clínica A").await;
        let admin = test_support::seed_user(&pool, clinic, UserRole::Admin, "adm@a.com").await;
        test_support::set_plan(&pool, clinic, "starter").await;

        // Plano Starter: até 2 funcionários ativos
        let first = create(&pool, &admin, clinic, new_staff("s1@a.com", "Sofia"))
            .await
            .unwrap();
        create(&pool, &admin, clinic, new_staff("s2@a.com", "Bruno"))
            .await
            .unwrap();

        let result = create(&pool, &admin, clinic, new_staff("s3@a.com", "Carla")).await;
        assert!(matches!(result, Err(ServiceError::CapacityExceeded(_))));

        // Nenhuma linha foi gravada na tentativa negada
        assert_eq!(list(&pool, &admin, clinic).await.unwrap().len(), 2);

        // Desativar um funcionário libera a vaga
        toggle_active(&pool, &admin, first.id, clinic).await.unwrap();
        create(&pool, &admin, clinic, new_staff("s3@a.com", "Carla"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let pool = test_support::pool().await;
        let clinic_a = test_support::seed_clinic(&pool, "Clínica A").await;
        let clinic_b = test_support::seed_clinic(&pool, "Clínica B").await;
        let admin_a = test_support::seed_user(&pool, clinic_a, UserRole::Admin, "adm@a.com").await;
        let admin_b = test_support::seed_user(&pool, clinic_b, UserRole::Admin, "adm@b.com").await;
        test_support::set_plan(&pool, clinic_a, "pro").await;
        test_support::set_plan(&pool, clinic_b, "pro").await;

        create(&pool, &admin_a, clinic_a, new_staff("dup@x.com", "Sofia"))
            .await
            .unwrap();

        // Unicidade de e-mail é global, não por clínica
        let result = create(&pool, &admin_b, clinic_b, new_staff("dup@x.com", "Outra")).await;
        assert!(matches!(result, Err(ServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_validation_aggregates_errors() {
        let pool = test_support::pool().await;
        let clinic = test_support::seed_clinic(&pool, "Clínica A").await;
        let admin = test_support::seed_user(&pool, clinic, UserRole::Admin, "adm@a.com").await;
        test_support::set_plan(&pool, clinic, "starter").await;

        let invalid = NewStaff {
            email: "nao-e-email".to_string(),
            password: "fraca".to_string(),
            full_name: String::new(),
            department: None,
            position: None,
            permissions: None,
        };

        match create(&pool, &admin, clinic, invalid).await {
            Err(ServiceError::Validation(errors)) => {
                // E-mail, política de senha, nome e permissões, todos juntos
                assert!(errors.len() >= 4);
            }
            other => panic!("esperava Validation, obteve {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_staff_cannot_administer() {
        let pool = test_support::pool().await;
        let clinic = test_support::seed_clinic(&pool, "Clínica A").await;
        let staff = test_support::seed_user(&pool, clinic, UserRole::Staff, "s@a.com").await;

        let result = list(&pool, &staff, clinic).await;
        assert!(matches!(
            result,
            Err(ServiceError::Authorization(DenyReason::RoleForbidden))
        ));
    }

    #[tokio::test]
    async fn test_update_rehashes_password_and_strips_credential() {
        let pool = test_support::pool().await;
        let clinic = test_support::seed_clinic(&pool, "Clínica A").await;
        let admin = test_support::seed_user(&pool, clinic, UserRole::Admin, "adm@a.com").await;
        test_support::set_plan(&pool, clinic, "starter").await;

        let staff = create(&pool, &admin, clinic, new_staff("s@a.com", "Sofia"))
            .await
            .unwrap();

        let patch = StaffPatch {
            password: Some("Nova-senha1!".to_string()),
            full_name: Some("Sofia Prado".to_string()),
            ..Default::default()
        };
        let updated = update(&pool, &admin, staff.id, clinic, patch).await.unwrap();
        assert_eq!(updated.full_name, "Sofia Prado");

        // A resposta serializada nunca carrega credencial
        let json = serde_json::to_value(&updated).unwrap();
        assert!(json.get("password").is_none());
        assert!(json.get("passwordHash").is_none());

        // A senha armazenada é um hash verificável, nunca o texto puro
        let stored: String = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = ?")
            .bind(staff.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_ne!(stored, "Nova-senha1!");
        assert!(crypto::verify_password("Nova-senha1!", &stored).unwrap());
    }

    #[tokio::test]
    async fn test_list_is_ordered_by_full_name() {
        let pool = test_support::pool().await;
        let clinic = test_support::seed_clinic(&pool, "Clínica A").await;
        let admin = test_support::seed_user(&pool, clinic, UserRole::Admin, "adm@a.com").await;
        test_support::set_plan(&pool, clinic, "enterprise").await;

        for (email, name) in [("c@a.com", "Carla"), ("a@a.com", "Alice"), ("b@a.com", "Bruno")] {
            create(&pool, &admin, clinic, new_staff(email, name)).await.unwrap();
        }

        let listed = list(&pool, &admin, clinic).await.unwrap();
        let order: Vec<_> = listed.iter().map(|s| s.full_name.as_str()).collect();
        assert_eq!(order, vec!["Alice", "Bruno", "Carla"]);
    }

    #[tokio::test]
    async fn test_unknown_staff_is_not_found() {
        let pool = test_support::pool().await;
        let clinic = test_support::seed_clinic(&pool, "Clínica A").await;
        let admin = test_support::seed_user(&pool, clinic, UserRole::Admin, "adm@a.com").await;

        let result = toggle_active(&pool, &admin, Uuid::new_v4(), clinic).await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }
}
