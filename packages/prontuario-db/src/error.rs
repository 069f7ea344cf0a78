//! Definições de erro para a biblioteca prontuario-db
//!
//! Este módulo define os tipos de erro usados pela biblioteca

use thiserror::Error;

/// Erros específicos para operações de banco de dados
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Erro de conexão com banco de dados: {0}")]
    ConnectionError(String),

    #[error("Erro de consulta: {0}")]
    QueryError(String),

    #[error("Entidade não encontrada: {0}")]
    NotFound(String),

    #[error("Violação de unicidade: {0}")]
    UniqueViolation(String),

    #[error("Violação de restrição: {0}")]
    ConstraintViolation(String),

    #[error("Erro interno: {0}")]
    InternalError(String),
}

/// Conversão de erros específicos do SQLx para nossos tipos de erro
impl From<sqlx::Error> for DbError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => DbError::NotFound("Registro não encontrado".to_string()),
            sqlx::Error::Database(dbe) => {
                if let Some(code) = dbe.code() {
                    // Códigos estendidos do SQLite para violação de unicidade
                    if code.as_ref() == "2067" || code.as_ref() == "1555" {
                        return DbError::UniqueViolation(dbe.message().to_string());
                    }
                    // Demais violações de restrição (chave estrangeira, CHECK)
                    if code.as_ref().starts_with("787") || code.as_ref().starts_with("275") {
                        return DbError::ConstraintViolation(dbe.message().to_string());
                    }
                }
                if dbe.message().contains("constraint") {
                    return DbError::ConstraintViolation(dbe.message().to_string());
                }
                DbError::QueryError(dbe.message().to_string())
            }
            sqlx::Error::ColumnNotFound(col) => {
                DbError::QueryError(format!("Coluna não encontrada: {}", col))
            }
            sqlx::Error::TypeNotFound { type_name } => {
                DbError::QueryError(format!("Tipo não encontrado: {}", type_name))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::QueryError(format!("Erro ao decodificar coluna {}: {}", index, source))
            }
            sqlx::Error::Io(io_err) => DbError::ConnectionError(io_err.to_string()),
            sqlx::Error::Configuration(conf_err) => DbError::ConnectionError(conf_err.to_string()),
            sqlx::Error::PoolClosed => {
                DbError::ConnectionError("Pool de conexões fechado".to_string())
            }
            sqlx::Error::PoolTimedOut => {
                DbError::ConnectionError("Timeout no pool de conexões".to_string())
            }
            sqlx::Error::WorkerCrashed => {
                DbError::InternalError("Worker do banco de dados falhou".to_string())
            }
            _ => DbError::InternalError(format!("Erro inesperado: {:?}", error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unique_violation_is_distinguished() -> anyhow::Result<()> {
        let pool = crate::init_test_pool().await?;

        sqlx::query("INSERT INTO clinics (id, name) VALUES ('c1', 'Clínica A')")
            .execute(&pool)
            .await?;

        let insert = "INSERT INTO users (id, email, password_hash, full_name, role, permissions, clinic_id) \
                      VALUES (?, 'dup@example.com', 'h', 'Fulano', 'staff', '[]', 'c1')";
        sqlx::query(insert).bind("u1").execute(&pool).await?;

        let err: DbError = sqlx::query(insert)
            .bind("u2")
            .execute(&pool)
            .await
            .unwrap_err()
            .into();

        assert!(matches!(err, DbError::UniqueViolation(_)));
        Ok(())
    }
}
