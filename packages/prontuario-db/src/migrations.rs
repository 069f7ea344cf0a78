//! Sistema de migrações para banco de dados
//!
//! Este módulo gerencia as migrações do banco de dados SQLite

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::{error, info};

/// Lista de migrações SQL a serem aplicadas
const MIGRATIONS: &[&str] = &[
    // 001_initial_schema.sql
    r#"
    -- Tabela de clínicas (limite de tenant: todo dado pertence a uma clínica)
    CREATE TABLE IF NOT EXISTS clinics (
        id TEXT PRIMARY KEY NOT NULL,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        name TEXT NOT NULL,
        address TEXT,
        phone TEXT,
        email TEXT,
        settings TEXT -- JSON com configurações da clínica
    );

    -- Tabela de usuários das clínicas (ADMIN e STAFF; operadores de
    -- plataforma ficam em tabela separada por serem outro limite de confiança)
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY NOT NULL,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        full_name TEXT NOT NULL,
        role TEXT NOT NULL CHECK (role IN ('admin', 'staff')),
        permissions TEXT NOT NULL, -- JSON com conjunto de capacidades
        is_active BOOLEAN NOT NULL DEFAULT 1,
        email_verified BOOLEAN NOT NULL DEFAULT 0,
        department TEXT,
        position TEXT,
        last_login_at TIMESTAMP,
        clinic_id TEXT NOT NULL,
        FOREIGN KEY (clinic_id) REFERENCES clinics (id)
    );

    -- Credenciais dos operadores da plataforma (CORE_ADMIN)
    CREATE TABLE IF NOT EXISTS operator_credentials (
        id TEXT PRIMARY KEY NOT NULL,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL
    );

    -- Tabela de pacientes com exclusão lógica
    CREATE TABLE IF NOT EXISTS patients (
        id TEXT PRIMARY KEY NOT NULL,
        clinic_id TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        first_name_phonetic TEXT NOT NULL,
        last_name_phonetic TEXT NOT NULL,
        date_of_birth DATE NOT NULL,
        gender TEXT NOT NULL,
        first_visit_date DATE NOT NULL,
        is_deleted BOOLEAN NOT NULL DEFAULT 0,
        deleted_at TIMESTAMP,
        deleted_by TEXT,
        created_by TEXT NOT NULL,
        updated_by TEXT,
        FOREIGN KEY (clinic_id) REFERENCES clinics (id),
        FOREIGN KEY (created_by) REFERENCES users (id)
    );

    -- Entradas de prontuário: exclusão sempre lógica, com motivo obrigatório
    CREATE TABLE IF NOT EXISTS chart_entries (
        id TEXT PRIMARY KEY NOT NULL,
        patient_id TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        date TIMESTAMP NOT NULL,
        content TEXT NOT NULL,
        therapy_methods TEXT NOT NULL, -- JSON com lista de métodos terapêuticos
        next_appointment TIMESTAMP,
        created_by TEXT NOT NULL,
        updated_by TEXT,
        modified_reason TEXT,
        is_deleted BOOLEAN NOT NULL DEFAULT 0,
        deleted_at TIMESTAMP,
        deleted_by TEXT,
        delete_reason TEXT,
        version INTEGER NOT NULL DEFAULT 1,
        FOREIGN KEY (patient_id) REFERENCES patients (id),
        FOREIGN KEY (created_by) REFERENCES users (id)
    );

    -- Trilha de auditoria imutável das entradas de prontuário
    CREATE TABLE IF NOT EXISTS chart_audit_events (
        id TEXT PRIMARY KEY NOT NULL,
        entry_id TEXT NOT NULL,
        actor_id TEXT NOT NULL,
        action TEXT NOT NULL CHECK (action IN ('created', 'amended', 'deleted')),
        reason TEXT,
        occurred_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (entry_id) REFERENCES chart_entries (id)
    );

    -- Assinaturas: uma por clínica
    CREATE TABLE IF NOT EXISTS subscriptions (
        id TEXT PRIMARY KEY NOT NULL,
        clinic_id TEXT NOT NULL UNIQUE,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        plan TEXT NOT NULL CHECK (plan IN ('free', 'starter', 'pro', 'enterprise')),
        billing_cycle TEXT NOT NULL CHECK (billing_cycle IN ('monthly', 'yearly')),
        status TEXT NOT NULL CHECK (status IN ('active', 'canceled')),
        provider_customer_id TEXT,
        provider_subscription_id TEXT,
        FOREIGN KEY (clinic_id) REFERENCES clinics (id)
    );

    -- Tokens de verificação de e-mail do cadastro de administradores
    CREATE TABLE IF NOT EXISTS email_verifications (
        id TEXT PRIMARY KEY NOT NULL,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        email TEXT NOT NULL,
        token TEXT NOT NULL UNIQUE,
        expires_at TIMESTAMP NOT NULL,
        consumed_at TIMESTAMP
    );

    -- Índices para otimização
    CREATE INDEX IF NOT EXISTS idx_users_clinic_id ON users (clinic_id);
    CREATE INDEX IF NOT EXISTS idx_patients_clinic_id ON patients (clinic_id);
    CREATE INDEX IF NOT EXISTS idx_patients_phonetic ON patients (clinic_id, last_name_phonetic);
    CREATE INDEX IF NOT EXISTS idx_chart_entries_patient_id ON chart_entries (patient_id);
    CREATE INDEX IF NOT EXISTS idx_chart_entries_date ON chart_entries (date);
    CREATE INDEX IF NOT EXISTS idx_chart_audit_entry_id ON chart_audit_events (entry_id);
    "#,
];

/// Executa todas as migrações pendentes no banco de dados
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Aplicando migrações de banco de dados...");

    // Obter a versão atual do banco de dados
    let mut version: i64 = 0;
    match sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await
    {
        Ok(v) => version = v,
        Err(e) => {
            error!("Erro ao obter versão do banco: {}", e);
            // Continuar mesmo assim, pois pode ser a primeira execução
        }
    }

    info!("Versão atual do banco: {}", version);

    // Aplicar cada migração pendente sequencialmente
    for (i, migration_sql) in MIGRATIONS.iter().enumerate() {
        let migration_version = (i + 1) as i64;

        // Pular migrações já aplicadas
        if migration_version <= version {
            info!("Migração {} já aplicada", migration_version);
            continue;
        }

        info!("Aplicando migração {}...", migration_version);

        // Executar em uma transação para garantir atomicidade
        let mut transaction = pool.begin().await
            .context(format!("Falha ao iniciar transação para migração {}", migration_version))?;

        // Executar os comandos SQL
        sqlx::query(migration_sql)
            .execute(&mut *transaction)
            .await
            .context(format!("Falha ao executar migração {}", migration_version))?;

        // Atualizar versão do banco
        sqlx::query(&format!("PRAGMA user_version = {}", migration_version))
            .execute(&mut *transaction)
            .await
            .context(format!("Falha ao atualizar versão para {}", migration_version))?;

        // Commit da transação
        transaction.commit().await
            .context(format!("Falha ao confirmar transação para migração {}", migration_version))?;

        info!("Migração {} aplicada com sucesso", migration_version);
    }

    info!("Migrações concluídas. Versão atual: {}", MIGRATIONS.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqliteConnectOptions;
    use sqlx::SqlitePool;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_migrations() -> Result<()> {
        // Usar diretório temporário para testes
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("test_migrations.db");

        // Conectar
        let conn_options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(conn_options).await?;

        // Aplicar migrações
        run_migrations(&pool).await?;

        // Verificar versão do banco
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&pool)
            .await?;

        assert_eq!(version, MIGRATIONS.len() as i64);

        // Verificar se tabelas foram criadas
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'"
        )
        .fetch_all(&pool)
        .await?;

        // Verificar algumas tabelas esperadas
        assert!(tables.contains(&"clinics".to_string()));
        assert!(tables.contains(&"users".to_string()));
        assert!(tables.contains(&"operator_credentials".to_string()));
        assert!(tables.contains(&"patients".to_string()));
        assert!(tables.contains(&"chart_entries".to_string()));
        assert!(tables.contains(&"chart_audit_events".to_string()));
        assert!(tables.contains(&"subscriptions".to_string()));
        assert!(tables.contains(&"email_verifications".to_string()));

        Ok(())
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("test_idempotent.db");

        let conn_options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(conn_options).await?;

        // Aplicar duas vezes não deve falhar nem duplicar nada
        run_migrations(&pool).await?;
        run_migrations(&pool).await?;

        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&pool)
            .await?;

        assert_eq!(version, MIGRATIONS.len() as i64);
        Ok(())
    }

    #[tokio::test]
    async fn test_email_unique_constraint() -> Result<()> {
        let pool = crate::init_test_pool().await?;

        sqlx::query("INSERT INTO clinics (id, name) VALUES ('c1', 'Clínica A')")
            .execute(&pool)
            .await?;

        let insert = "INSERT INTO users (id, email, password_hash, full_name, role, permissions, clinic_id) \
                      VALUES (?, 'dup@example.com', 'h', 'Fulano', 'staff', '[]', 'c1')";

        sqlx::query(insert).bind("u1").execute(&pool).await?;

        // Segunda inserção com o mesmo e-mail viola a restrição de unicidade
        let result = sqlx::query(insert).bind("u2").execute(&pool).await;
        assert!(result.is_err());

        Ok(())
    }
}
