//! Ciclo de vida de assinaturas
//!
//! Upgrade e cancelamento do plano de uma clínica. O provedor de pagamento é
//! um colaborador opaco atrás de uma trait: o núcleo só decide quando chamar
//! e o que persistir, nunca lida com o formato de fio do provedor. Toda
//! mudança de plano vale imediatamente; proração e cobrança ficam no
//! provedor.

use crate::authorize::{self, CLINIC_ADMIN};
use crate::error::ServiceError;
use crate::identity::Caller;
use crate::plans::PlanTier;
use async_trait::async_trait;
use prontuario_db::models::{BillingCycle, Subscription};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

/// Colaborador externo de pagamento
///
/// As referências devolvidas são ids opacos do provedor, persistidos na
/// assinatura; qualquer falha vira `UpstreamFailure` no núcleo.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Cria um cliente no provedor e devolve sua referência opaca
    async fn create_customer(&self, email: &str) -> anyhow::Result<String>;

    /// Cria uma assinatura para o cliente e devolve sua referência opaca
    async fn create_subscription(
        &self,
        customer_id: &str,
        plan: PlanTier,
        cycle: BillingCycle,
    ) -> anyhow::Result<String>;

    /// Cancela uma assinatura existente no provedor
    async fn cancel_subscription(&self, subscription_id: &str) -> anyhow::Result<()>;
}

async fn find_by_clinic(
    pool: &SqlitePool,
    clinic_id: Uuid,
) -> Result<Option<Subscription>, ServiceError> {
    let subscription = sqlx::query_as("SELECT * FROM subscriptions WHERE clinic_id = ?")
        .bind(clinic_id)
        .fetch_optional(pool)
        .await?;
    Ok(subscription)
}

/// Contrata ou troca o plano pago da clínica
///
/// A reatribuição de plano vale imediatamente; nenhum dado criado no plano
/// anterior é afetado.
pub async fn upgrade(
    pool: &SqlitePool,
    provider: &dyn PaymentProvider,
    caller: &Caller,
    clinic_id: Uuid,
    billing_email: &str,
    plan: PlanTier,
    cycle: BillingCycle,
) -> Result<Subscription, ServiceError> {
    authorize::guard(pool, caller, &CLINIC_ADMIN, clinic_id).await?;
    if plan == PlanTier::Free {
        return Err(ServiceError::invalid_field(
            "plan",
            "O plano gratuito não é contratável; use o cancelamento",
        ));
    }

    let existing = find_by_clinic(pool, clinic_id).await?;

    // Reaproveita o cliente do provedor quando a clínica já assinou antes
    let customer_id = match existing.as_ref().and_then(|s| s.provider_customer_id.clone()) {
        Some(id) => id,
        None => provider
            .create_customer(billing_email)
            .await
            .map_err(ServiceError::Upstream)?,
    };

    let subscription_id = provider
        .create_subscription(&customer_id, plan, cycle)
        .await
        .map_err(ServiceError::Upstream)?;

    sqlx::query(
        "INSERT INTO subscriptions (id, clinic_id, plan, billing_cycle, status, \
         provider_customer_id, provider_subscription_id) \
         VALUES (?, ?, ?, ?, 'active', ?, ?) \
         ON CONFLICT (clinic_id) DO UPDATE SET \
            plan = excluded.plan, \
            billing_cycle = excluded.billing_cycle, \
            status = 'active', \
            provider_customer_id = excluded.provider_customer_id, \
            provider_subscription_id = excluded.provider_subscription_id, \
            updated_at = CURRENT_TIMESTAMP",
    )
    .bind(Uuid::new_v4())
    .bind(clinic_id)
    .bind(plan.to_string())
    .bind(cycle.to_string())
    .bind(&customer_id)
    .bind(&subscription_id)
    .execute(pool)
    .await?;

    info!(clinic_id = %clinic_id, plan = %plan, "Assinatura contratada");
    find_by_clinic(pool, clinic_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Assinatura".to_string()))
}

/// Cancela a assinatura da clínica
///
/// Transição de mão única: a semântica do plano volta a `free` na hora, sem
/// apagar dado algum criado em plano superior.
pub async fn cancel(
    pool: &SqlitePool,
    provider: &dyn PaymentProvider,
    caller: &Caller,
    clinic_id: Uuid,
) -> Result<(), ServiceError> {
    authorize::guard(pool, caller, &CLINIC_ADMIN, clinic_id).await?;

    let subscription = find_by_clinic(pool, clinic_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Assinatura".to_string()))?;

    if let Some(provider_subscription_id) = &subscription.provider_subscription_id {
        provider
            .cancel_subscription(provider_subscription_id)
            .await
            .map_err(ServiceError::Upstream)?;
    }

    sqlx::query(
        "UPDATE subscriptions SET status = 'canceled', updated_at = CURRENT_TIMESTAMP \
         WHERE clinic_id = ?",
    )
    .bind(clinic_id)
    .execute(pool)
    .await?;

    info!(clinic_id = %clinic_id, "Assinatura cancelada");
    Ok(())
}
