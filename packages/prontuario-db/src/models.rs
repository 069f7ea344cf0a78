//! Modelos de dados compartilhados entre aplicações
//!
//! Este módulo define as estruturas de dados principais do prontuário:
//! clínicas, usuários, pacientes, entradas de prontuário e assinaturas.
//!
//! Os campos de auditoria das entradas de prontuário (`createdBy`, `updatedBy`,
//! `modifiedReason`, `isDeleted`, `deletedAt`, `deletedBy`, `deleteReason`)
//! são serializados exatamente com esses nomes; alterá-los quebra o contrato
//! com os consumidores existentes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use uuid::Uuid;

/// Papéis de usuário dentro de uma clínica
///
/// O papel de operador da plataforma (CORE_ADMIN) não aparece aqui de
/// propósito: operadores vivem em outra tabela e outro limite de confiança.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Administrador da clínica (acesso total)
    Admin,
    /// Funcionário com capacidades concedidas individualmente
    Staff,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::Staff => write!(f, "staff"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "staff" => Ok(UserRole::Staff),
            other => Err(format!("Papel de usuário inválido: {}", other)),
        }
    }
}

/// Conjunto de capacidades de um usuário
///
/// Substitui o antigo curinga `"*"` por uma variante explícita de acesso
/// total, evitando comparação de strings em cada ponto de checagem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PermissionSet {
    /// Acesso total (administradores)
    Full,
    /// Capacidades nomeadas concedidas individualmente
    Granted { capabilities: Vec<String> },
}

impl PermissionSet {
    /// Verifica se a capacidade nomeada está concedida
    pub fn grants(&self, capability: &str) -> bool {
        match self {
            PermissionSet::Full => true,
            PermissionSet::Granted { capabilities } => {
                capabilities.iter().any(|c| c == capability)
            }
        }
    }
}

/// Representa uma clínica (limite de tenant)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clinic {
    /// Identificador único da clínica
    pub id: Uuid,
    /// Nome da clínica
    pub name: String,
    /// Endereço
    pub address: Option<String>,
    /// Telefone de contato
    pub phone: Option<String>,
    /// E-mail de contato
    pub email: Option<String>,
    /// Configurações livres em JSON
    pub settings: Option<serde_json::Value>,
    /// Data e hora de criação do registro
    pub created_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for Clinic {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let settings: Option<String> = row.try_get("settings")?;
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            address: row.try_get("address")?,
            phone: row.try_get("phone")?,
            email: row.try_get("email")?,
            settings: settings
                .map(|s| serde_json::from_str(&s))
                .transpose()
                .map_err(|e| sqlx::Error::ColumnDecode {
                    index: String::from("settings"),
                    source: Box::new(e),
                })?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Usuário de uma clínica (ADMIN ou STAFF)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Identificador único do usuário
    pub id: Uuid,
    /// E-mail (único em toda a plataforma)
    pub email: String,
    /// Hash da senha; nunca serializado em respostas
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Nome completo
    pub full_name: String,
    /// Papel dentro da clínica
    pub role: UserRole,
    /// Conjunto de capacidades
    pub permissions: PermissionSet,
    /// Conta ativa (desativação é o único mecanismo de revogação)
    pub is_active: bool,
    /// E-mail verificado após o cadastro
    pub email_verified: bool,
    /// Departamento (apenas STAFF)
    pub department: Option<String>,
    /// Cargo (apenas STAFF)
    pub position: Option<String>,
    /// Clínica à qual o usuário pertence
    pub clinic_id: Uuid,
    /// Último acesso registrado
    pub last_login_at: Option<DateTime<Utc>>,
}

impl FromRow<'_, SqliteRow> for User {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let role: String = row.try_get("role")?;
        let permissions: String = row.try_get("permissions")?;
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            full_name: row.try_get("full_name")?,
            role: role.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
                index: String::from("role"),
                source: Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            })?,
            permissions: serde_json::from_str(&permissions).map_err(|e| {
                sqlx::Error::ColumnDecode {
                    index: String::from("permissions"),
                    source: Box::new(e),
                }
            })?,
            is_active: row.try_get("is_active")?,
            email_verified: row.try_get("email_verified")?,
            department: row.try_get("department")?,
            position: row.try_get("position")?,
            clinic_id: row.try_get("clinic_id")?,
            last_login_at: row.try_get("last_login_at")?,
        })
    }
}

/// Visão de funcionário sem o campo de credencial, para listagens
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffSummary {
    /// Identificador único
    pub id: Uuid,
    /// E-mail
    pub email: String,
    /// Nome completo
    pub full_name: String,
    /// Departamento
    pub department: Option<String>,
    /// Cargo
    pub position: Option<String>,
    /// Conta ativa
    pub is_active: bool,
    /// Conjunto de capacidades
    pub permissions: PermissionSet,
    /// Último acesso registrado
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<User> for StaffSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            department: user.department,
            position: user.position,
            is_active: user.is_active,
            permissions: user.permissions,
            last_login_at: user.last_login_at,
        }
    }
}

/// Paciente de uma clínica, com exclusão lógica
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    /// Identificador único do paciente
    pub id: Uuid,
    /// Clínica à qual o paciente pertence
    pub clinic_id: Uuid,
    /// Nome
    pub first_name: String,
    /// Sobrenome
    pub last_name: String,
    /// Leitura fonética do nome
    pub first_name_phonetic: String,
    /// Leitura fonética do sobrenome (chave de ordenação das listagens)
    pub last_name_phonetic: String,
    /// Data de nascimento
    pub date_of_birth: NaiveDate,
    /// Gênero
    pub gender: String,
    /// Data da primeira visita
    pub first_visit_date: NaiveDate,
    /// Excluído logicamente
    pub is_deleted: bool,
    /// Momento da exclusão lógica
    pub deleted_at: Option<DateTime<Utc>>,
    /// Usuário que excluiu
    pub deleted_by: Option<Uuid>,
    /// Usuário que criou o registro
    pub created_by: Uuid,
    /// Último usuário que atualizou o registro
    pub updated_by: Option<Uuid>,
    /// Data e hora de criação
    pub created_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for Patient {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            clinic_id: row.try_get("clinic_id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            first_name_phonetic: row.try_get("first_name_phonetic")?,
            last_name_phonetic: row.try_get("last_name_phonetic")?,
            date_of_birth: row.try_get("date_of_birth")?,
            gender: row.try_get("gender")?,
            first_visit_date: row.try_get("first_visit_date")?,
            is_deleted: row.try_get("is_deleted")?,
            deleted_at: row.try_get("deleted_at")?,
            deleted_by: row.try_get("deleted_by")?,
            created_by: row.try_get("created_by")?,
            updated_by: row.try_get("updated_by")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Entrada de prontuário de um paciente
///
/// Toda emenda exige motivo de edição e toda exclusão lógica exige motivo de
/// exclusão; os metadados de emenda e de exclusão são rastreados em campos
/// independentes e nunca se misturam.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartEntry {
    /// Identificador único da entrada
    pub id: Uuid,
    /// Paciente ao qual a entrada pertence
    pub patient_id: Uuid,
    /// Data clínica do atendimento
    pub date: DateTime<Utc>,
    /// Conteúdo livre do atendimento
    pub content: String,
    /// Métodos terapêuticos aplicados
    pub therapy_methods: Vec<String>,
    /// Próximo atendimento previsto
    pub next_appointment: Option<DateTime<Utc>>,
    /// Usuário que criou a entrada
    pub created_by: Uuid,
    /// Último usuário que emendou a entrada
    pub updated_by: Option<Uuid>,
    /// Motivo da última emenda
    pub modified_reason: Option<String>,
    /// Excluída logicamente (estado terminal)
    pub is_deleted: bool,
    /// Momento da exclusão lógica
    pub deleted_at: Option<DateTime<Utc>>,
    /// Usuário que excluiu
    pub deleted_by: Option<Uuid>,
    /// Motivo da exclusão
    pub delete_reason: Option<String>,
    /// Contador de versão para escrita condicional
    pub version: i64,
    /// Data e hora de criação
    pub created_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for ChartEntry {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let therapy_methods: String = row.try_get("therapy_methods")?;
        Ok(Self {
            id: row.try_get("id")?,
            patient_id: row.try_get("patient_id")?,
            date: row.try_get("date")?,
            content: row.try_get("content")?,
            therapy_methods: serde_json::from_str(&therapy_methods).map_err(|e| {
                sqlx::Error::ColumnDecode {
                    index: String::from("therapy_methods"),
                    source: Box::new(e),
                }
            })?,
            next_appointment: row.try_get("next_appointment")?,
            created_by: row.try_get("created_by")?,
            updated_by: row.try_get("updated_by")?,
            modified_reason: row.try_get("modified_reason")?,
            is_deleted: row.try_get("is_deleted")?,
            deleted_at: row.try_get("deleted_at")?,
            deleted_by: row.try_get("deleted_by")?,
            delete_reason: row.try_get("delete_reason")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Ação registrada na trilha de auditoria de uma entrada
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Entrada criada
    Created,
    /// Entrada emendada
    Amended,
    /// Entrada excluída logicamente
    Deleted,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditAction::Created => write!(f, "created"),
            AuditAction::Amended => write!(f, "amended"),
            AuditAction::Deleted => write!(f, "deleted"),
        }
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(AuditAction::Created),
            "amended" => Ok(AuditAction::Amended),
            "deleted" => Ok(AuditAction::Deleted),
            other => Err(format!("Ação de auditoria inválida: {}", other)),
        }
    }
}

/// Evento imutável da trilha de auditoria de uma entrada de prontuário
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartAuditEvent {
    /// Identificador único do evento
    pub id: Uuid,
    /// Entrada de prontuário à qual o evento se refere
    pub entry_id: Uuid,
    /// Usuário que executou a ação
    pub actor_id: Uuid,
    /// Ação executada
    pub action: AuditAction,
    /// Motivo informado (ausente apenas na criação)
    pub reason: Option<String>,
    /// Momento da ação
    pub occurred_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for ChartAuditEvent {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let action: String = row.try_get("action")?;
        Ok(Self {
            id: row.try_get("id")?,
            entry_id: row.try_get("entry_id")?,
            actor_id: row.try_get("actor_id")?,
            action: action.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
                index: String::from("action"),
                source: Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            })?,
            reason: row.try_get("reason")?,
            occurred_at: row.try_get("occurred_at")?,
        })
    }
}

/// Status de uma assinatura
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Assinatura ativa
    Active,
    /// Assinatura cancelada (semântica do plano volta a free)
    Canceled,
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionStatus::Active => write!(f, "active"),
            SubscriptionStatus::Canceled => write!(f, "canceled"),
        }
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "canceled" => Ok(SubscriptionStatus::Canceled),
            other => Err(format!("Status de assinatura inválido: {}", other)),
        }
    }
}

/// Ciclo de cobrança de uma assinatura
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    /// Cobrança mensal
    Monthly,
    /// Cobrança anual
    Yearly,
}

impl std::fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BillingCycle::Monthly => write!(f, "monthly"),
            BillingCycle::Yearly => write!(f, "yearly"),
        }
    }
}

impl std::str::FromStr for BillingCycle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(BillingCycle::Monthly),
            "yearly" => Ok(BillingCycle::Yearly),
            other => Err(format!("Ciclo de cobrança inválido: {}", other)),
        }
    }
}

/// Assinatura de uma clínica junto ao provedor de pagamento
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Identificador único da assinatura
    pub id: Uuid,
    /// Clínica assinante
    pub clinic_id: Uuid,
    /// Plano contratado (armazenado como texto; interpretado pelo núcleo)
    pub plan: String,
    /// Ciclo de cobrança
    pub billing_cycle: BillingCycle,
    /// Status atual
    pub status: SubscriptionStatus,
    /// Referência opaca do cliente no provedor de pagamento
    pub provider_customer_id: Option<String>,
    /// Referência opaca da assinatura no provedor de pagamento
    pub provider_subscription_id: Option<String>,
    /// Data e hora de criação
    pub created_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for Subscription {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let billing_cycle: String = row.try_get("billing_cycle")?;
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            clinic_id: row.try_get("clinic_id")?,
            plan: row.try_get("plan")?,
            billing_cycle: billing_cycle.parse().map_err(|e: String| {
                sqlx::Error::ColumnDecode {
                    index: String::from("billing_cycle"),
                    source: Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
                }
            })?,
            status: status.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
                index: String::from("status"),
                source: Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            })?,
            provider_customer_id: row.try_get("provider_customer_id")?,
            provider_subscription_id: row.try_get("provider_subscription_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Token de verificação de e-mail emitido no cadastro de administradores
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailVerification {
    /// Identificador único
    pub id: Uuid,
    /// E-mail a ser verificado
    pub email: String,
    /// Token opaco enviado por e-mail
    pub token: String,
    /// Validade do token
    pub expires_at: DateTime<Utc>,
    /// Momento em que o token foi consumido
    pub consumed_at: Option<DateTime<Utc>>,
}

impl FromRow<'_, SqliteRow> for EmailVerification {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            token: row.try_get("token")?,
            expires_at: row.try_get("expires_at")?,
            consumed_at: row.try_get("consumed_at")?,
        })
    }
}
