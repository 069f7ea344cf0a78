//! Livro de registros clínicos
//!
//! Máquina de estados de uma entrada de prontuário: **Ativa** (criada, zero ou
//! mais emendas) → **Excluída** (terminal, lógica). Toda emenda exige motivo
//! de edição não vazio e toda exclusão exige motivo de exclusão não vazio;
//! este é o contrato de auditoria central do sistema.
//!
//! Além dos campos mutáveis (`modifiedReason` guarda apenas o último motivo),
//! cada criação, emenda e exclusão grava um evento imutável em
//! `chart_audit_events`, na mesma transação, para que nenhum motivo se perca.
//!
//! Emenda e exclusão são escritas condicionais sobre o contador de versão da
//! entrada; quem perde a corrida recebe `Conflict` em vez de sobrescrever em
//! silêncio.
//!
//! Política de cascata decidida: a exclusão lógica de um paciente NÃO se
//! propaga às entradas; elas continuam armazenadas e auditáveis, alcançáveis
//! por id e pela trilha de auditoria, mas não pela listagem por paciente.

use crate::authorize::{self, CLINIC_ADMIN, CLINIC_MEMBER};
use crate::error::{FieldError, ServiceError};
use crate::identity::Caller;
use chrono::{DateTime, Utc};
use prontuario_db::models::{AuditAction, ChartAuditEvent, ChartEntry};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, Sqlite, SqlitePool, Transaction};
use tracing::info;
use uuid::Uuid;

/// Dados para criação de uma entrada de prontuário
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChartEntry {
    pub patient_id: Uuid,
    pub date: Option<DateTime<Utc>>,
    pub content: String,
    /// Deve estar presente; a lista pode ser vazia
    pub therapy_methods: Option<Vec<String>>,
    pub next_appointment: Option<DateTime<Utc>>,
}

/// Dados para emenda de uma entrada
///
/// A emenda sobrescreve os campos mutáveis por inteiro, inclusive o próximo
/// atendimento (ausente limpa o campo).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartAmendment {
    pub content: String,
    pub therapy_methods: Option<Vec<String>>,
    pub next_appointment: Option<DateTime<Utc>>,
    /// Motivo de edição, obrigatório e não vazio
    pub edit_reason: String,
    /// Versão esperada da entrada, quando o cliente quer escrita condicional
    pub expected_version: Option<i64>,
}

/// Entrada de prontuário enriquecida apenas com o nome de quem a criou
#[derive(Debug, Clone, Serialize)]
pub struct ChartEntryView {
    #[serde(flatten)]
    pub entry: ChartEntry,
    /// Nome de exibição do criador; nenhum outro campo de usuário vaza
    #[serde(rename = "creatorName")]
    pub creator_name: String,
}

impl FromRow<'_, SqliteRow> for ChartEntryView {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            entry: ChartEntry::from_row(row)?,
            creator_name: row.try_get("creator_name")?,
        })
    }
}

fn validate_new(data: &NewChartEntry) -> Result<(), ServiceError> {
    let mut errors = Vec::new();
    if data.date.is_none() {
        errors.push(FieldError::new("date", "Data do atendimento é obrigatória"));
    }
    if data.content.trim().is_empty() {
        errors.push(FieldError::new("content", "Conteúdo do atendimento é obrigatório"));
    }
    if data.therapy_methods.is_none() {
        errors.push(FieldError::new(
            "therapyMethods",
            "Métodos terapêuticos devem ser informados como lista",
        ));
    }
    ServiceError::from_fields(errors)
}

fn validate_amendment(data: &ChartAmendment) -> Result<(), ServiceError> {
    let mut errors = Vec::new();
    if data.content.trim().is_empty() {
        errors.push(FieldError::new("content", "Conteúdo do atendimento é obrigatório"));
    }
    if data.therapy_methods.is_none() {
        errors.push(FieldError::new(
            "therapyMethods",
            "Métodos terapêuticos devem ser informados como lista",
        ));
    }
    if data.edit_reason.trim().is_empty() {
        errors.push(FieldError::new("editReason", "Motivo da edição é obrigatório"));
    }
    ServiceError::from_fields(errors)
}

/// Paciente não excluído no escopo da clínica; precondição das criações
async fn patient_in_clinic(
    pool: &SqlitePool,
    patient_id: Uuid,
    clinic_id: Uuid,
) -> Result<(), ServiceError> {
    let exists: Option<(Uuid,)> = sqlx::query_as(
        "SELECT id FROM patients WHERE id = ? AND clinic_id = ? AND is_deleted = 0",
    )
    .bind(patient_id)
    .bind(clinic_id)
    .fetch_optional(pool)
    .await?;

    exists
        .map(|_| ())
        .ok_or_else(|| ServiceError::NotFound("Paciente".to_string()))
}

/// Entrada não excluída cujo paciente pertence à clínica
///
/// Entradas excluídas não são emendáveis; a tentativa cai aqui como NotFound,
/// porque toda consulta filtra linhas excluídas.
async fn find_scoped(
    pool: &SqlitePool,
    entry_id: Uuid,
    clinic_id: Uuid,
) -> Result<ChartEntry, ServiceError> {
    let entry: Option<ChartEntry> = sqlx::query_as(
        "SELECT ce.* FROM chart_entries ce \
         JOIN patients p ON p.id = ce.patient_id \
         WHERE ce.id = ? AND ce.is_deleted = 0 AND p.clinic_id = ?",
    )
    .bind(entry_id)
    .bind(clinic_id)
    .fetch_optional(pool)
    .await?;

    entry.ok_or_else(|| ServiceError::NotFound("Entrada de prontuário".to_string()))
}

async fn append_audit_event(
    tx: &mut Transaction<'_, Sqlite>,
    entry_id: Uuid,
    actor_id: Uuid,
    action: AuditAction,
    reason: Option<&str>,
) -> Result<(), ServiceError> {
    sqlx::query(
        "INSERT INTO chart_audit_events (id, entry_id, actor_id, action, reason, occurred_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4())
    .bind(entry_id)
    .bind(actor_id)
    .bind(action.to_string())
    .bind(reason)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Cria uma entrada de prontuário para um paciente da clínica
pub async fn create(
    pool: &SqlitePool,
    caller: &Caller,
    clinic_id: Uuid,
    data: NewChartEntry,
) -> Result<ChartEntry, ServiceError> {
    authorize::guard(pool, caller, &CLINIC_MEMBER, clinic_id).await?;
    validate_new(&data)?;
    patient_in_clinic(pool, data.patient_id, clinic_id).await?;

    let id = Uuid::new_v4();
    let therapy_methods = serde_json::to_string(&data.therapy_methods.unwrap_or_default())
        .map_err(|e| ServiceError::Upstream(e.into()))?;

    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO chart_entries (id, patient_id, date, content, therapy_methods, \
         next_appointment, created_by) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(data.patient_id)
    .bind(data.date)
    .bind(&data.content)
    .bind(&therapy_methods)
    .bind(data.next_appointment)
    .bind(caller.id)
    .execute(&mut *tx)
    .await?;

    append_audit_event(&mut tx, id, caller.id, AuditAction::Created, None).await?;
    tx.commit().await?;

    info!(entry_id = %id, patient_id = %data.patient_id, "Entrada de prontuário criada");
    find_scoped(pool, id, clinic_id).await
}

/// Emenda uma entrada ativa
///
/// Sobrescreve os campos mutáveis e guarda o motivo em `modifiedReason`
/// (apenas o último; o histórico completo fica na trilha de auditoria).
pub async fn amend(
    pool: &SqlitePool,
    caller: &Caller,
    entry_id: Uuid,
    clinic_id: Uuid,
    data: ChartAmendment,
) -> Result<ChartEntry, ServiceError> {
    authorize::guard(pool, caller, &CLINIC_MEMBER, clinic_id).await?;
    validate_amendment(&data)?;
    let current = find_scoped(pool, entry_id, clinic_id).await?;

    let expected_version = data.expected_version.unwrap_or(current.version);
    let therapy_methods = serde_json::to_string(&data.therapy_methods.unwrap_or_default())
        .map_err(|e| ServiceError::Upstream(e.into()))?;

    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        "UPDATE chart_entries SET \
            content = ?, \
            therapy_methods = ?, \
            next_appointment = ?, \
            updated_by = ?, \
            modified_reason = ?, \
            updated_at = CURRENT_TIMESTAMP, \
            version = version + 1 \
         WHERE id = ? AND version = ? AND is_deleted = 0",
    )
    .bind(&data.content)
    .bind(&therapy_methods)
    .bind(data.next_appointment)
    .bind(caller.id)
    .bind(&data.edit_reason)
    .bind(entry_id)
    .bind(expected_version)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        // Alguém emendou ou excluiu a entrada entre a leitura e a escrita
        return Err(ServiceError::Conflict(
            "Entrada de prontuário modificada concorrentemente".to_string(),
        ));
    }

    append_audit_event(&mut tx, entry_id, caller.id, AuditAction::Amended, Some(&data.edit_reason))
        .await?;
    tx.commit().await?;

    info!(entry_id = %entry_id, "Entrada de prontuário emendada");
    find_scoped(pool, entry_id, clinic_id).await
}

/// Exclui logicamente uma entrada ativa (estado terminal)
pub async fn soft_delete(
    pool: &SqlitePool,
    caller: &Caller,
    entry_id: Uuid,
    clinic_id: Uuid,
    delete_reason: &str,
    expected_version: Option<i64>,
) -> Result<(), ServiceError> {
    authorize::guard(pool, caller, &CLINIC_MEMBER, clinic_id).await?;
    if delete_reason.trim().is_empty() {
        return Err(ServiceError::invalid_field(
            "deleteReason",
            "Motivo da exclusão é obrigatório",
        ));
    }
    let current = find_scoped(pool, entry_id, clinic_id).await?;
    let expected_version = expected_version.unwrap_or(current.version);

    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        "UPDATE chart_entries SET \
            is_deleted = 1, \
            deleted_at = ?, \
            deleted_by = ?, \
            delete_reason = ?, \
            version = version + 1 \
         WHERE id = ? AND version = ? AND is_deleted = 0",
    )
    .bind(Utc::now())
    .bind(caller.id)
    .bind(delete_reason)
    .bind(entry_id)
    .bind(expected_version)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ServiceError::Conflict(
            "Entrada de prontuário modificada concorrentemente".to_string(),
        ));
    }

    append_audit_event(&mut tx, entry_id, caller.id, AuditAction::Deleted, Some(delete_reason))
        .await?;
    tx.commit().await?;

    info!(entry_id = %entry_id, "Entrada de prontuário excluída logicamente");
    Ok(())
}

/// Busca uma entrada não excluída, com o nome do criador
pub async fn get(
    pool: &SqlitePool,
    caller: &Caller,
    entry_id: Uuid,
    clinic_id: Uuid,
) -> Result<ChartEntryView, ServiceError> {
    authorize::guard(pool, caller, &CLINIC_MEMBER, clinic_id).await?;

    let entry: Option<ChartEntryView> = sqlx::query_as(
        "SELECT ce.*, u.full_name AS creator_name FROM chart_entries ce \
         JOIN patients p ON p.id = ce.patient_id \
         JOIN users u ON u.id = ce.created_by \
         WHERE ce.id = ? AND ce.is_deleted = 0 AND p.clinic_id = ?",
    )
    .bind(entry_id)
    .bind(clinic_id)
    .fetch_optional(pool)
    .await?;

    entry.ok_or_else(|| ServiceError::NotFound("Entrada de prontuário".to_string()))
}

/// Lista as entradas não excluídas de um paciente, da mais recente para a
/// mais antiga
pub async fn list(
    pool: &SqlitePool,
    caller: &Caller,
    patient_id: Uuid,
    clinic_id: Uuid,
) -> Result<Vec<ChartEntryView>, ServiceError> {
    authorize::guard(pool, caller, &CLINIC_MEMBER, clinic_id).await?;
    patient_in_clinic(pool, patient_id, clinic_id).await?;

    let entries = sqlx::query_as(
        "SELECT ce.*, u.full_name AS creator_name FROM chart_entries ce \
         JOIN patients p ON p.id = ce.patient_id \
         JOIN users u ON u.id = ce.created_by \
         WHERE ce.patient_id = ? AND ce.is_deleted = 0 AND p.clinic_id = ? \
         ORDER BY ce.date DESC",
    )
    .bind(patient_id)
    .bind(clinic_id)
    .fetch_all(pool)
    .await?;

    Ok(entries)
}

/// Trilha de auditoria completa de uma entrada, em ordem cronológica
///
/// Restrita a administradores; inclui entradas já excluídas, que continuam
/// auditáveis.
pub async fn audit_trail(
    pool: &SqlitePool,
    caller: &Caller,
    entry_id: Uuid,
    clinic_id: Uuid,
) -> Result<Vec<ChartAuditEvent>, ServiceError> {
    authorize::guard(pool, caller, &CLINIC_ADMIN, clinic_id).await?;

    // Sem filtro de exclusão: a trilha sobrevive à entrada
    let exists: Option<(Uuid,)> = sqlx::query_as(
        "SELECT ce.id FROM chart_entries ce \
         JOIN patients p ON p.id = ce.patient_id \
         WHERE ce.id = ? AND p.clinic_id = ?",
    )
    .bind(entry_id)
    .bind(clinic_id)
    .fetch_optional(pool)
    .await?;
    if exists.is_none() {
        return Err(ServiceError::NotFound("Entrada de prontuário".to_string()));
    }

    let events = sqlx::query_as(
        "SELECT * FROM chart_audit_events WHERE entry_id = ? ORDER BY occurred_at ASC, id ASC",
    )
    .bind(entry_id)
    .fetch_all(pool)
    .await?;

    Ok(events)
}
