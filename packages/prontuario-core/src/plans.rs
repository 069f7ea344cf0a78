//! Modelo de planos e direitos de uso
//!
//! Cada clínica tem no máximo uma assinatura; o plano ativo determina um
//! nível monotônico de direitos (free=0 < starter=1 < pro=2 < enterprise=3).
//! Uma funcionalidade exigindo o nível L está disponível se e somente se o
//! nível atual da clínica for maior ou igual a L. Cancelamento volta a
//! semântica do plano imediatamente para `free`, sem apagar dado algum.

use crate::error::ServiceError;
use prontuario_db::models::SubscriptionStatus;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Planos de assinatura oferecidos, em ordem total de direitos
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    /// Gratuito: somente o administrador
    Free,
    /// Starter: até 2 funcionários
    Starter,
    /// Pro: até 5 funcionários
    Pro,
    /// Grande porte: sem limites
    Enterprise,
}

impl PlanTier {
    /// Nível de direitos do plano (0..3)
    pub fn entitlement_level(&self) -> u8 {
        match self {
            PlanTier::Free => 0,
            PlanTier::Starter => 1,
            PlanTier::Pro => 2,
            PlanTier::Enterprise => 3,
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanTier::Free => write!(f, "free"),
            PlanTier::Starter => write!(f, "starter"),
            PlanTier::Pro => write!(f, "pro"),
            PlanTier::Enterprise => write!(f, "enterprise"),
        }
    }
}

impl std::str::FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(PlanTier::Free),
            "starter" => Ok(PlanTier::Starter),
            "pro" => Ok(PlanTier::Pro),
            "enterprise" => Ok(PlanTier::Enterprise),
            other => Err(format!("Plano inválido: {}", other)),
        }
    }
}

/// Limites de capacidade de um plano; `None` significa sem limite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanLimits {
    /// Número máximo de funcionários ativos (o administrador não conta)
    pub staff_limit: Option<u32>,
    /// Armazenamento total em bytes
    pub storage_bytes: Option<u64>,
}

/// Verifica se o plano atual dá acesso a uma funcionalidade gated
pub fn has_access(current: PlanTier, required: PlanTier) -> bool {
    current.entitlement_level() >= required.entitlement_level()
}

/// Tabela de limites do produto por plano
pub fn limits_for(tier: PlanTier) -> PlanLimits {
    match tier {
        PlanTier::Free => PlanLimits {
            staff_limit: Some(0),
            storage_bytes: Some(500 * 1024 * 1024),
        },
        PlanTier::Starter => PlanLimits {
            staff_limit: Some(2),
            storage_bytes: Some(7 * 1024 * 1024 * 1024),
        },
        PlanTier::Pro => PlanLimits {
            staff_limit: Some(5),
            storage_bytes: Some(20 * 1024 * 1024 * 1024),
        },
        PlanTier::Enterprise => PlanLimits {
            staff_limit: None,
            storage_bytes: None,
        },
    }
}

/// Plano vigente da clínica: o da assinatura ativa, senão `free`
///
/// Assinatura cancelada conta como ausente; nenhum dado criado em plano
/// superior é afetado pela reversão.
pub async fn current_tier(pool: &SqlitePool, clinic_id: Uuid) -> Result<PlanTier, ServiceError> {
    let row: Option<(String, String)> = sqlx::query_as(
        "SELECT plan, status FROM subscriptions WHERE clinic_id = ?",
    )
    .bind(clinic_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some((plan, status)) => {
            let status: SubscriptionStatus = status
                .parse()
                .map_err(|e: String| ServiceError::Upstream(anyhow::anyhow!(e)))?;
            if status == SubscriptionStatus::Active {
                plan.parse()
                    .map_err(|e: String| ServiceError::Upstream(anyhow::anyhow!(e)))
            } else {
                Ok(PlanTier::Free)
            }
        }
        None => Ok(PlanTier::Free),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering_is_fixed() {
        assert!(PlanTier::Free < PlanTier::Starter);
        assert!(PlanTier::Starter < PlanTier::Pro);
        assert!(PlanTier::Pro < PlanTier::Enterprise);
        assert_eq!(PlanTier::Free.entitlement_level(), 0);
        assert_eq!(PlanTier::Enterprise.entitlement_level(), 3);
    }

    #[test]
    fn test_has_access_is_monotonic() {
        let tiers = [
            PlanTier::Free,
            PlanTier::Starter,
            PlanTier::Pro,
            PlanTier::Enterprise,
        ];

        for required in tiers {
            for (i, lower) in tiers.iter().enumerate() {
                for higher in &tiers[i..] {
                    // Subir de plano nunca revoga acesso já concedido
                    if has_access(*lower, required) {
                        assert!(has_access(*higher, required));
                    }
                }
            }
        }
    }

    #[test]
    fn test_staff_limits_match_product_table() {
        assert_eq!(limits_for(PlanTier::Free).staff_limit, Some(0));
        assert_eq!(limits_for(PlanTier::Starter).staff_limit, Some(2));
        assert_eq!(limits_for(PlanTier::Pro).staff_limit, Some(5));
        assert_eq!(limits_for(PlanTier::Enterprise).staff_limit, None);
    }

    #[tokio::test]
    async fn test_current_tier_defaults_to_free() -> anyhow::Result<()> {
        let pool = prontuario_db::init_test_pool().await?;
        let tier = current_tier(&pool, Uuid::new_v4()).await.unwrap();
        assert_eq!(tier, PlanTier::Free);
        Ok(())
    }

    #[tokio::test]
    async fn test_canceled_subscription_reverts_to_free() -> anyhow::Result<()> {
        let pool = prontuario_db::init_test_pool().await?;
        let clinic_id = Uuid::new_v4();

        sqlx::query("INSERT INTO clinics (id, name) VALUES (?, 'Clínica A')")
            .bind(clinic_id)
            .execute(&pool)
            .await?;
        sqlx::query(
            "INSERT INTO subscriptions (id, clinic_id, plan, billing_cycle, status) \
             VALUES (?, ?, 'pro', 'monthly', 'canceled')",
        )
        .bind(Uuid::new_v4())
        .bind(clinic_id)
        .execute(&pool)
        .await?;

        let tier = current_tier(&pool, clinic_id).await.unwrap();
        assert_eq!(tier, PlanTier::Free);
        Ok(())
    }
}
