//! Porta de autorização
//!
//! Função de decisão pura consultada antes de toda operação mutante e de toda
//! operação administrativa. Combina papel, escopo de clínica e nível de plano,
//! nesta ordem: conta ativa, papel permitido, mesmo tenant, plano suficiente.
//! Nunca tem efeito colateral e nunca falha: devolve `Allow` ou um motivo de
//! negação etiquetado.

use crate::error::DenyReason;
use crate::identity::{Caller, Role};
use crate::plans::{self, PlanTier};
use uuid::Uuid;

/// Resultado da porta de autorização
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Operação permitida
    Allow,
    /// Operação negada, com motivo
    Deny(DenyReason),
}

impl Decision {
    /// Converte a decisão em `Result` para uso com `?`
    pub fn into_result(self) -> Result<(), crate::error::ServiceError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(DenyReason::CapacityExceeded) => Err(
                crate::error::ServiceError::CapacityExceeded(
                    "limite de funcionários do plano atingido".to_string(),
                ),
            ),
            Decision::Deny(reason) => Err(crate::error::ServiceError::Authorization(reason)),
        }
    }
}

/// Descrição estática de uma ação protegida
#[derive(Debug, Clone, Copy)]
pub struct Action {
    /// Papéis autorizados a executar a ação
    pub allowed_roles: &'static [Role],
    /// Plano mínimo exigido, se a ação for gated por plano
    pub required_plan: Option<PlanTier>,
}

/// Ações de membro de clínica (pacientes e prontuários)
pub const CLINIC_MEMBER: Action = Action {
    allowed_roles: &[Role::Admin, Role::Staff],
    required_plan: None,
};

/// Ações administrativas da clínica
pub const CLINIC_ADMIN: Action = Action {
    allowed_roles: &[Role::Admin, Role::CoreAdmin],
    required_plan: None,
};

/// Criação de funcionários: administrativa e gated a partir do plano Starter
pub const STAFF_CREATE: Action = Action {
    allowed_roles: &[Role::Admin, Role::CoreAdmin],
    required_plan: Some(PlanTier::Starter),
};

/// Decide se o chamador pode executar a ação sobre a clínica alvo
///
/// `CoreAdmin` é independente de clínica e dispensa a checagem de tenant; sua
/// autenticação acontece à parte, contra o repositório de operadores.
pub fn authorize(
    caller: &Caller,
    action: &Action,
    target_clinic: Uuid,
    current_tier: PlanTier,
) -> Decision {
    // (a) conta ativa
    if !caller.is_active {
        return Decision::Deny(DenyReason::InactiveAccount);
    }

    // (b) papel permitido
    if !action.allowed_roles.contains(&caller.role) {
        return Decision::Deny(DenyReason::RoleForbidden);
    }

    // (c) isolamento de tenant, exceto operadores da plataforma
    if caller.role != Role::CoreAdmin {
        match caller.clinic_id {
            Some(clinic_id) if clinic_id == target_clinic => {}
            Some(_) => return Decision::Deny(DenyReason::WrongTenant),
            None => return Decision::Deny(DenyReason::Unauthenticated),
        }
    }

    // (d) nível de plano, quando a ação é gated
    if let Some(required) = action.required_plan {
        if !plans::has_access(current_tier, required) {
            return Decision::Deny(DenyReason::PlanInsufficient);
        }
    }

    Decision::Allow
}

/// Consulta a porta de autorização buscando o plano vigente quando preciso
///
/// Conveniência das camadas de serviço: ações sem gating de plano não tocam o
/// banco.
pub async fn guard(
    pool: &sqlx::SqlitePool,
    caller: &Caller,
    action: &Action,
    target_clinic: Uuid,
) -> Result<(), crate::error::ServiceError> {
    let tier = if action.required_plan.is_some() {
        plans::current_tier(pool, target_clinic).await?
    } else {
        PlanTier::Free
    };
    authorize(caller, action, target_clinic, tier).into_result()
}

/// Checagem secundária de capacidade para criação de funcionários
pub fn check_staff_capacity(tier: PlanTier, active_staff_count: u32) -> Decision {
    match plans::limits_for(tier).staff_limit {
        Some(limit) if active_staff_count >= limit => {
            Decision::Deny(DenyReason::CapacityExceeded)
        }
        _ => Decision::Allow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prontuario_db::models::PermissionSet;

    fn staff_caller(clinic_id: Uuid) -> Caller {
        Caller {
            id: Uuid::new_v4(),
            clinic_id: Some(clinic_id),
            role: Role::Staff,
            is_active: true,
            permissions: PermissionSet::Granted { capabilities: vec![] },
        }
    }

    fn admin_caller(clinic_id: Uuid) -> Caller {
        Caller {
            id: Uuid::new_v4(),
            clinic_id: Some(clinic_id),
            role: Role::Admin,
            is_active: true,
            permissions: PermissionSet::Full,
        }
    }

    #[test]
    fn test_inactive_account_is_denied_first() {
        let clinic = Uuid::new_v4();
        let mut caller = admin_caller(clinic);
        caller.is_active = false;

        // Mesmo com papel e tenant corretos, conta inativa nega primeiro
        let decision = authorize(&caller, &CLINIC_ADMIN, clinic, PlanTier::Enterprise);
        assert_eq!(decision, Decision::Deny(DenyReason::InactiveAccount));
    }

    #[test]
    fn test_staff_cannot_run_admin_actions() {
        let clinic = Uuid::new_v4();
        let caller = staff_caller(clinic);

        let decision = authorize(&caller, &CLINIC_ADMIN, clinic, PlanTier::Pro);
        assert_eq!(decision, Decision::Deny(DenyReason::RoleForbidden));
    }

    #[test]
    fn test_cross_tenant_is_denied() {
        let caller = staff_caller(Uuid::new_v4());

        let decision = authorize(&caller, &CLINIC_MEMBER, Uuid::new_v4(), PlanTier::Free);
        assert_eq!(decision, Decision::Deny(DenyReason::WrongTenant));
    }

    #[test]
    fn test_core_admin_bypasses_tenant_check() {
        let operator = Caller::operator(Uuid::new_v4());

        let decision = authorize(&operator, &CLINIC_ADMIN, Uuid::new_v4(), PlanTier::Free);
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn test_plan_gating() {
        let clinic = Uuid::new_v4();
        let caller = admin_caller(clinic);

        // Plano free não alcança o nível Starter exigido
        let decision = authorize(&caller, &STAFF_CREATE, clinic, PlanTier::Free);
        assert_eq!(decision, Decision::Deny(DenyReason::PlanInsufficient));

        // Após o upgrade a mesma chamada passa
        let decision = authorize(&caller, &STAFF_CREATE, clinic, PlanTier::Starter);
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn test_staff_capacity_limits() {
        assert_eq!(
            check_staff_capacity(PlanTier::Starter, 2),
            Decision::Deny(DenyReason::CapacityExceeded)
        );
        assert_eq!(check_staff_capacity(PlanTier::Starter, 1), Decision::Allow);
        // Enterprise não tem limite
        assert_eq!(check_staff_capacity(PlanTier::Enterprise, 10_000), Decision::Allow);
    }

    #[test]
    fn test_member_action_allows_both_roles() {
        let clinic = Uuid::new_v4();
        assert_eq!(
            authorize(&staff_caller(clinic), &CLINIC_MEMBER, clinic, PlanTier::Free),
            Decision::Allow
        );
        assert_eq!(
            authorize(&admin_caller(clinic), &CLINIC_MEMBER, clinic, PlanTier::Free),
            Decision::Allow
        );
    }
}
