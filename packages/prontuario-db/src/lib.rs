//! Prontuário DB - Biblioteca de persistência do prontuário eletrônico
//!
//! Esta biblioteca fornece:
//! - Modelos de dados compartilhados (clínicas, usuários, pacientes, prontuários)
//! - Migrações automáticas do banco de dados
//! - Pool de conexão e funções de utilidades para SQLite
//!
//! Toda entidade pertence a exatamente uma clínica; o escopo por clínica é
//! aplicado nas consultas das camadas superiores, nunca relaxado aqui.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

pub mod error;
pub mod migrations;
pub mod models;

/// Configuração da conexão com o banco de dados
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Caminho para o arquivo SQLite
    pub db_path: String,
    /// Número máximo de conexões no pool
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            db_path: "data/prontuario.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Inicializa uma conexão com o banco de dados SQLite
pub async fn init_db_pool(config: &DbConfig) -> Result<SqlitePool> {
    let db_path = Path::new(&config.db_path);

    // Verifica se o diretório pai existe
    if let Some(parent) = db_path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)
                .context("Falha ao criar diretório para banco de dados")?;
        }
    }

    // Configura as opções de conexão SQLite
    let connection_options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .foreign_keys(true)
        .pragma("synchronous", "NORMAL");

    // Cria o pool de conexões
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(connection_options)
        .await
        .context("Falha ao conectar ao banco de dados SQLite")?;

    // Aplica migrações automáticas
    migrations::run_migrations(&pool).await
        .context("Falha ao aplicar migrações")?;

    info!("Banco de dados inicializado com sucesso: {}", config.db_path);
    Ok(pool)
}

/// Cria um pool em memória com o esquema aplicado, para uso em testes
pub async fn init_test_pool() -> Result<SqlitePool> {
    let connection_options = SqliteConnectOptions::new()
        .filename(":memory:")
        .foreign_keys(true);

    // Uma única conexão: bancos ":memory:" são independentes por conexão
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connection_options)
        .await
        .context("Falha ao criar banco em memória")?;

    migrations::run_migrations(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_db_connection() -> Result<()> {
        // Usar diretório temporário para testes
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("test.db");

        let config = DbConfig {
            db_path: db_path.to_str().unwrap().to_string(),
            max_connections: 2,
        };

        // Inicializar banco
        let pool = init_db_pool(&config).await?;

        // Verificar se podemos executar consulta simples
        let result: (i64,) = sqlx::query_as("SELECT 1")
            .fetch_one(&pool)
            .await?;

        assert_eq!(result.0, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_in_memory_pool() -> Result<()> {
        let pool = init_test_pool().await?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM clinics")
            .fetch_one(&pool)
            .await?;

        assert_eq!(count, 0);
        Ok(())
    }
}
