//! Registro de pacientes
//!
//! Operações de cadastro, atualização, exclusão lógica e consulta de
//! pacientes, sempre no escopo de uma clínica. Registros excluídos
//! logicamente saem de todas as listagens e consultas padrão, mas permanecem
//! no banco para auditoria.
//!
//! A exclusão de paciente não pede motivo; a de entrada de prontuário pede.
//! A assimetria vem do comportamento observado do produto e é mantida de
//! propósito.

use crate::authorize::{self, CLINIC_MEMBER};
use crate::error::{FieldError, ServiceError};
use crate::identity::Caller;
use chrono::{NaiveDate, Utc};
use prontuario_db::models::Patient;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

/// Dados para cadastro de um paciente
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPatient {
    pub first_name: String,
    pub last_name: String,
    pub first_name_phonetic: String,
    pub last_name_phonetic: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: String,
    pub first_visit_date: Option<NaiveDate>,
}

/// Atualização parcial de um paciente; campos ausentes ficam como estão
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub first_name_phonetic: Option<String>,
    pub last_name_phonetic: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub first_visit_date: Option<NaiveDate>,
}

fn require(errors: &mut Vec<FieldError>, field: &str, value: &str, message: &str) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, message));
    }
}

fn validate_new(data: &NewPatient) -> Result<(), ServiceError> {
    // Todos os campos de identidade são obrigatórios; os erros são
    // acumulados e devolvidos juntos, nunca um por vez
    let mut errors = Vec::new();
    require(&mut errors, "firstName", &data.first_name, "Nome é obrigatório");
    require(&mut errors, "lastName", &data.last_name, "Sobrenome é obrigatório");
    require(
        &mut errors,
        "firstNamePhonetic",
        &data.first_name_phonetic,
        "Leitura fonética do nome é obrigatória",
    );
    require(
        &mut errors,
        "lastNamePhonetic",
        &data.last_name_phonetic,
        "Leitura fonética do sobrenome é obrigatória",
    );
    if data.date_of_birth.is_none() {
        errors.push(FieldError::new("dateOfBirth", "Data de nascimento é obrigatória"));
    }
    require(&mut errors, "gender", &data.gender, "Gênero é obrigatório");
    if data.first_visit_date.is_none() {
        errors.push(FieldError::new("firstVisitDate", "Data da primeira visita é obrigatória"));
    }
    ServiceError::from_fields(errors)
}

fn validate_patch(patch: &PatientPatch) -> Result<(), ServiceError> {
    // Campos presentes não podem ser esvaziados
    let mut errors = Vec::new();
    if let Some(v) = &patch.first_name {
        require(&mut errors, "firstName", v, "Nome é obrigatório");
    }
    if let Some(v) = &patch.last_name {
        require(&mut errors, "lastName", v, "Sobrenome é obrigatório");
    }
    if let Some(v) = &patch.first_name_phonetic {
        require(&mut errors, "firstNamePhonetic", v, "Leitura fonética do nome é obrigatória");
    }
    if let Some(v) = &patch.last_name_phonetic {
        require(
            &mut errors,
            "lastNamePhonetic",
            v,
            "Leitura fonética do sobrenome é obrigatória",
        );
    }
    if let Some(v) = &patch.gender {
        require(&mut errors, "gender", v, "Gênero é obrigatório");
    }
    ServiceError::from_fields(errors)
}

/// Busca o paciente não excluído no escopo da clínica
///
/// Ausência e pertencimento a outra clínica são indistinguíveis de propósito.
async fn find_scoped(
    pool: &SqlitePool,
    patient_id: Uuid,
    clinic_id: Uuid,
) -> Result<Patient, ServiceError> {
    let patient: Option<Patient> = sqlx::query_as(
        "SELECT * FROM patients WHERE id = ? AND clinic_id = ? AND is_deleted = 0",
    )
    .bind(patient_id)
    .bind(clinic_id)
    .fetch_optional(pool)
    .await?;

    patient.ok_or_else(|| ServiceError::NotFound("Paciente".to_string()))
}

/// Cadastra um paciente na clínica
pub async fn create(
    pool: &SqlitePool,
    caller: &Caller,
    clinic_id: Uuid,
    data: NewPatient,
) -> Result<Patient, ServiceError> {
    authorize::guard(pool, caller, &CLINIC_MEMBER, clinic_id).await?;
    validate_new(&data)?;

    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO patients (id, clinic_id, first_name, last_name, first_name_phonetic, \
         last_name_phonetic, date_of_birth, gender, first_visit_date, created_by) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(clinic_id)
    .bind(&data.first_name)
    .bind(&data.last_name)
    .bind(&data.first_name_phonetic)
    .bind(&data.last_name_phonetic)
    .bind(data.date_of_birth)
    .bind(&data.gender)
    .bind(data.first_visit_date)
    .bind(caller.id)
    .execute(pool)
    .await?;

    info!(patient_id = %id, clinic_id = %clinic_id, "Paciente cadastrado");
    find_scoped(pool, id, clinic_id).await
}

/// Atualiza parcialmente um paciente
pub async fn update(
    pool: &SqlitePool,
    caller: &Caller,
    patient_id: Uuid,
    clinic_id: Uuid,
    patch: PatientPatch,
) -> Result<Patient, ServiceError> {
    authorize::guard(pool, caller, &CLINIC_MEMBER, clinic_id).await?;
    validate_patch(&patch)?;
    find_scoped(pool, patient_id, clinic_id).await?;

    sqlx::query(
        "UPDATE patients SET \
            first_name = COALESCE(?, first_name), \
            last_name = COALESCE(?, last_name), \
            first_name_phonetic = COALESCE(?, first_name_phonetic), \
            last_name_phonetic = COALESCE(?, last_name_phonetic), \
            date_of_birth = COALESCE(?, date_of_birth), \
            gender = COALESCE(?, gender), \
            first_visit_date = COALESCE(?, first_visit_date), \
            updated_by = ?, \
            updated_at = CURRENT_TIMESTAMP \
         WHERE id = ? AND clinic_id = ? AND is_deleted = 0",
    )
    .bind(patch.first_name)
    .bind(patch.last_name)
    .bind(patch.first_name_phonetic)
    .bind(patch.last_name_phonetic)
    .bind(patch.date_of_birth)
    .bind(patch.gender)
    .bind(patch.first_visit_date)
    .bind(caller.id)
    .bind(patient_id)
    .bind(clinic_id)
    .execute(pool)
    .await?;

    find_scoped(pool, patient_id, clinic_id).await
}

/// Exclui logicamente um paciente
///
/// Não há motivo obrigatório aqui (ao contrário das entradas de prontuário).
/// As entradas do paciente permanecem armazenadas e auditáveis; elas apenas
/// deixam de ser alcançáveis pelos caminhos de listagem por paciente.
pub async fn soft_delete(
    pool: &SqlitePool,
    caller: &Caller,
    patient_id: Uuid,
    clinic_id: Uuid,
) -> Result<(), ServiceError> {
    authorize::guard(pool, caller, &CLINIC_MEMBER, clinic_id).await?;
    find_scoped(pool, patient_id, clinic_id).await?;

    sqlx::query(
        "UPDATE patients SET is_deleted = 1, deleted_at = ?, deleted_by = ? \
         WHERE id = ? AND clinic_id = ? AND is_deleted = 0",
    )
    .bind(Utc::now())
    .bind(caller.id)
    .bind(patient_id)
    .bind(clinic_id)
    .execute(pool)
    .await?;

    info!(patient_id = %patient_id, clinic_id = %clinic_id, "Paciente excluído logicamente");
    Ok(())
}

/// Busca um paciente não excluído da clínica
pub async fn get(
    pool: &SqlitePool,
    caller: &Caller,
    patient_id: Uuid,
    clinic_id: Uuid,
) -> Result<Patient, ServiceError> {
    authorize::guard(pool, caller, &CLINIC_MEMBER, clinic_id).await?;
    find_scoped(pool, patient_id, clinic_id).await
}

/// Lista os pacientes não excluídos da clínica, por sobrenome fonético
pub async fn list(
    pool: &SqlitePool,
    caller: &Caller,
    clinic_id: Uuid,
) -> Result<Vec<Patient>, ServiceError> {
    authorize::guard(pool, caller, &CLINIC_MEMBER, clinic_id).await?;

    let patients = sqlx::query_as(
        "SELECT * FROM patients WHERE clinic_id = ? AND is_deleted = 0 \
         ORDER BY last_name_phonetic ASC",
    )
    .bind(clinic_id)
    .fetch_all(pool)
    .await?;

    Ok(patients)
}
