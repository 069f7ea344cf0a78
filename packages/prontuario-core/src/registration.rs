//! Cadastro de clínicas e acesso de operadores
//!
//! Fluxo de auto-cadastro: o administrador fundador cria a clínica e a sua
//! própria conta numa única transação, junto com o token de verificação de
//! e-mail. O envio do e-mail acontece depois do commit: uma falha do
//! notificador nunca desfaz o cadastro, apenas é sinalizada ao chamador.
//!
//! Operadores da plataforma vivem em `operator_credentials`, uma tabela
//! separada de `users`: o login de operador jamais consulta contas de
//! clínica, e vice-versa.

use crate::crypto::{self, HashParams};
use crate::error::{FieldError, ServiceError};
use crate::identity::Caller;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use prontuario_db::models::{EmailVerification, PermissionSet, User};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

/// Validade do token de verificação de e-mail
const VERIFICATION_TTL_HOURS: i64 = 24;

/// Colaborador de envio do e-mail de verificação
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VerificationNotifier: Send + Sync {
    /// Envia o token de verificação para o endereço informado
    async fn send_verification_email(&self, email: &str, token: &str) -> anyhow::Result<()>;
}

/// Dados do auto-cadastro de uma clínica
#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub clinic_name: String,
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub accepted_terms: bool,
}

fn validate_registration(data: &NewRegistration) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if data.clinic_name.trim().is_empty() {
        errors.push(FieldError::new("clinicName", "O nome da clínica é obrigatório"));
    }
    if data.full_name.trim().is_empty() {
        errors.push(FieldError::new("fullName", "O nome completo é obrigatório"));
    }
    if !validator::validate_email(&data.email) {
        errors.push(FieldError::new("email", "E-mail inválido"));
    }
    errors.extend(crypto::password_policy_errors(&data.password));
    if !data.accepted_terms {
        errors.push(FieldError::new("acceptedTerms", "É necessário aceitar os termos de uso"));
    }
    errors
}

/// Cadastra uma clínica nova com seu administrador fundador
///
/// Clínica, conta ADMIN e token de verificação nascem na mesma transação;
/// ou tudo existe, ou nada existe. O e-mail de verificação é enviado após o
/// commit: se falhar, o cadastro permanece e o erro devolvido carrega o id
/// do usuário para reenvio posterior.
pub async fn register_admin(
    pool: &SqlitePool,
    notifier: &dyn VerificationNotifier,
    data: &NewRegistration,
) -> Result<User, ServiceError> {
    ServiceError::from_fields(validate_registration(data))?;

    // Pré-checagem amigável; a constraint UNIQUE cobre a corrida
    let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(&data.email)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Err(ServiceError::Conflict(
            "Já existe uma conta com este e-mail".to_string(),
        ));
    }

    let password_hash = crypto::hash_password(&data.password, HashParams::default())?;
    let clinic_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let token = crypto::generate_token();
    let expires_at = Utc::now() + Duration::hours(VERIFICATION_TTL_HOURS);

    let mut transaction = pool.begin().await?;

    sqlx::query("INSERT INTO clinics (id, name) VALUES (?, ?)")
        .bind(clinic_id)
        .bind(data.clinic_name.trim())
        .execute(&mut *transaction)
        .await?;

    sqlx::query(
        "INSERT INTO users (id, email, password_hash, full_name, role, permissions, \
         is_active, email_verified, clinic_id) \
         VALUES (?, ?, ?, ?, 'admin', ?, 1, 0, ?)",
    )
    .bind(user_id)
    .bind(&data.email)
    .bind(&password_hash)
    .bind(data.full_name.trim())
    .bind(serde_json::to_string(&PermissionSet::Full).map_err(|e| ServiceError::Upstream(e.into()))?)
    .bind(clinic_id)
    .execute(&mut *transaction)
    .await?;

    sqlx::query(
        "INSERT INTO email_verifications (id, email, token, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4())
    .bind(&data.email)
    .bind(&token)
    .bind(expires_at)
    .execute(&mut *transaction)
    .await?;

    transaction.commit().await?;

    info!(clinic_id = %clinic_id, user_id = %user_id, "Clínica cadastrada");

    if let Err(e) = notifier.send_verification_email(&data.email, &token).await {
        warn!(user_id = %user_id, error = %e, "Falha ao enviar e-mail de verificação");
        return Err(ServiceError::NotificationFailed {
            user_id,
            message: e.to_string(),
        });
    }

    let user = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok(user)
}

/// Consome um token de verificação e marca o e-mail como verificado
///
/// Token desconhecido ou já consumido vira `NotFound`; token expirado vira
/// erro de validação, para que o chamador ofereça o reenvio.
pub async fn verify_email(pool: &SqlitePool, token: &str) -> Result<(), ServiceError> {
    let verification: EmailVerification = sqlx::query_as(
        "SELECT * FROM email_verifications WHERE token = ? AND consumed_at IS NULL",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ServiceError::NotFound("Token de verificação".to_string()))?;

    if verification.expires_at < Utc::now() {
        return Err(ServiceError::invalid_field(
            "token",
            "Token de verificação expirado; solicite um novo e-mail",
        ));
    }

    let mut transaction = pool.begin().await?;

    sqlx::query("UPDATE users SET email_verified = 1, updated_at = CURRENT_TIMESTAMP WHERE email = ?")
        .bind(&verification.email)
        .execute(&mut *transaction)
        .await?;

    sqlx::query("UPDATE email_verifications SET consumed_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(verification.id)
        .execute(&mut *transaction)
        .await?;

    transaction.commit().await?;

    info!(email = %verification.email, "E-mail verificado");
    Ok(())
}

/// Provisiona uma credencial de operador da plataforma
///
/// Operadores não pertencem a clínica alguma e nunca aparecem em `users`.
pub async fn provision_operator(
    pool: &SqlitePool,
    email: &str,
    password: &str,
) -> Result<Uuid, ServiceError> {
    let mut errors = Vec::new();
    if !validator::validate_email(email) {
        errors.push(FieldError::new("email", "E-mail inválido"));
    }
    errors.extend(crypto::password_policy_errors(password));
    ServiceError::from_fields(errors)?;

    let password_hash = crypto::hash_password(password, HashParams::default())?;
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO operator_credentials (id, email, password_hash) VALUES (?, ?, ?)")
        .bind(id)
        .bind(email)
        .bind(&password_hash)
        .execute(pool)
        .await?;

    info!(operator_id = %id, "Operador provisionado");
    Ok(id)
}

/// Autentica um operador contra a tabela de credenciais de operador
///
/// Credencial desconhecida e senha incorreta produzem o mesmo erro opaco.
pub async fn operator_login(
    pool: &SqlitePool,
    email: &str,
    password: &str,
) -> Result<Caller, ServiceError> {
    let row: Option<(Uuid, String)> =
        sqlx::query_as("SELECT id, password_hash FROM operator_credentials WHERE email = ?")
            .bind(email)
            .fetch_optional(pool)
            .await?;

    let (id, password_hash) = match row {
        Some(found) => found,
        None => {
            return Err(ServiceError::Authorization(
                crate::error::DenyReason::Unauthenticated,
            ))
        }
    };

    if !crypto::verify_password(password, &password_hash)? {
        return Err(ServiceError::Authorization(
            crate::error::DenyReason::Unauthenticated,
        ));
    }

    Ok(Caller::operator(id))
}
