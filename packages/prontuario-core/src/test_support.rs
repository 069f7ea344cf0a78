//! Utilidades compartilhadas pelos testes do núcleo

use crate::identity::Caller;
use prontuario_db::models::{PermissionSet, User, UserRole};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Cria um banco em memória com o esquema aplicado
pub async fn pool() -> SqlitePool {
    prontuario_db::init_test_pool()
        .await
        .expect("falha ao criar banco de teste")
}

/// Insere uma clínica e devolve seu id
pub async fn seed_clinic(pool: &SqlitePool, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO clinics (id, name) VALUES (?, ?)")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await
        .expect("falha ao inserir clínica");
    id
}

/// Insere um usuário e devolve o chamador correspondente
pub async fn seed_user(pool: &SqlitePool, clinic_id: Uuid, role: UserRole, email: &str) -> Caller {
    let id = Uuid::new_v4();
    let permissions = match role {
        UserRole::Admin => PermissionSet::Full,
        UserRole::Staff => PermissionSet::Granted {
            capabilities: vec!["patients:write".to_string(), "charts:write".to_string()],
        },
    };

    sqlx::query(
        "INSERT INTO users (id, email, password_hash, full_name, role, permissions, clinic_id) \
         VALUES (?, ?, 'hash-de-teste', 'Usuário de Teste', ?, ?, ?)",
    )
    .bind(id)
    .bind(email)
    .bind(role.to_string())
    .bind(serde_json::to_string(&permissions).unwrap())
    .bind(clinic_id)
    .execute(pool)
    .await
    .expect("falha ao inserir usuário");

    Caller::from_user(&User {
        id,
        email: email.to_string(),
        password_hash: "hash-de-teste".to_string(),
        full_name: "Usuário de Teste".to_string(),
        role,
        permissions,
        is_active: true,
        email_verified: true,
        department: None,
        position: None,
        clinic_id,
        last_login_at: None,
    })
}

/// Define a assinatura ativa da clínica com o plano informado
pub async fn set_plan(pool: &SqlitePool, clinic_id: Uuid, plan: &str) {
    sqlx::query(
        "INSERT INTO subscriptions (id, clinic_id, plan, billing_cycle, status) \
         VALUES (?, ?, ?, 'monthly', 'active') \
         ON CONFLICT (clinic_id) DO UPDATE SET plan = excluded.plan, status = 'active'",
    )
    .bind(Uuid::new_v4())
    .bind(clinic_id)
    .bind(plan)
    .execute(pool)
    .await
    .expect("falha ao definir plano");
}
