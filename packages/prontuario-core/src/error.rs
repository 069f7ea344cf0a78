//! Definições de erro do núcleo
//!
//! Este módulo define a taxonomia de erros exposta pelas operações do núcleo.
//! Toda operação resolve para exatamente um destes resultados; nenhuma
//! operação devolve carga parcial em caso de falha.

use prontuario_db::error::DbError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Motivos de negação da porta de autorização
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// Chamador não autenticado
    Unauthenticated,
    /// Conta desativada
    InactiveAccount,
    /// Papel do chamador não permite a ação
    RoleForbidden,
    /// Recurso pertence a outra clínica
    WrongTenant,
    /// Plano atual abaixo do nível exigido pela ação
    PlanInsufficient,
    /// Limite de capacidade do plano atingido
    CapacityExceeded,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let texto = match self {
            DenyReason::Unauthenticated => "não autenticado",
            DenyReason::InactiveAccount => "conta desativada",
            DenyReason::RoleForbidden => "papel sem permissão para a ação",
            DenyReason::WrongTenant => "recurso de outra clínica",
            DenyReason::PlanInsufficient => "plano atual não inclui esta funcionalidade",
            DenyReason::CapacityExceeded => "limite do plano atingido",
        };
        write!(f, "{}", texto)
    }
}

/// Erro de validação de um campo específico
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Nome do campo inválido
    pub field: String,
    /// Mensagem legível
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Erros das operações do núcleo
///
/// Ausência de entidade e acesso fora da clínica do chamador são devolvidos
/// igualmente como `NotFound`, para não revelar a existência de dados de
/// outros tenants.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Dados de entrada inválidos")]
    Validation(Vec<FieldError>),

    #[error("{0} não encontrado")]
    NotFound(String),

    #[error("Conflito: {0}")]
    Conflict(String),

    #[error("Acesso negado: {0}")]
    Authorization(DenyReason),

    #[error("Limite do plano atingido: {0}")]
    CapacityExceeded(String),

    #[error("Falha ao enviar notificação para o usuário {user_id}: {message}")]
    NotificationFailed {
        /// Usuário criado antes da falha de notificação; o cadastro persiste
        user_id: Uuid,
        message: String,
    },

    #[error("Falha em colaborador externo")]
    Upstream(#[source] anyhow::Error),
}

impl ServiceError {
    /// Constrói um erro de validação de um único campo
    pub fn invalid_field(field: &str, message: &str) -> Self {
        ServiceError::Validation(vec![FieldError::new(field, message)])
    }

    /// Erros de validação acumulados; vazio vira sucesso no ponto de uso
    pub fn from_fields(errors: Vec<FieldError>) -> Result<(), Self> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::Validation(errors))
        }
    }
}

/// Falhas de persistência viram `Upstream`, exceto os casos que o núcleo
/// trata como parte do contrato (ausência e unicidade)
impl From<DbError> for ServiceError {
    fn from(error: DbError) -> Self {
        match error {
            DbError::NotFound(what) => ServiceError::NotFound(what),
            DbError::UniqueViolation(what) => ServiceError::Conflict(what),
            other => ServiceError::Upstream(anyhow::Error::new(other)),
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(error: sqlx::Error) -> Self {
        ServiceError::from(DbError::from(error))
    }
}
