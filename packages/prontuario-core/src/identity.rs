//! Modelo de identidade e capacidades
//!
//! Define quem está pedindo: papel, clínica de origem e capacidades. O papel
//! de operador da plataforma (`CoreAdmin`) não pertence a clínica alguma e é
//! autenticado contra um repositório próprio de credenciais; ele nunca é
//! alcançável pelos caminhos de autenticação dos tenants.

use prontuario_db::models::{PermissionSet, User, UserRole};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Papel efetivo de um chamador
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Administrador de uma clínica
    Admin,
    /// Funcionário de uma clínica
    Staff,
    /// Operador da plataforma, independente de clínica
    CoreAdmin,
}

impl From<UserRole> for Role {
    fn from(role: UserRole) -> Self {
        match role {
            UserRole::Admin => Role::Admin,
            UserRole::Staff => Role::Staff,
        }
    }
}

/// Identidade resolvida de quem executa uma operação
///
/// A resolução em si (sessão, token) acontece fora do núcleo; aqui chega o
/// resultado já verificado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Identificador do usuário ou operador
    pub id: Uuid,
    /// Clínica do chamador; ausente apenas para `CoreAdmin`
    pub clinic_id: Option<Uuid>,
    /// Papel efetivo
    pub role: Role,
    /// Conta ativa
    pub is_active: bool,
    /// Conjunto de capacidades
    pub permissions: PermissionSet,
}

impl Caller {
    /// Constrói o chamador a partir de um usuário de clínica
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id,
            clinic_id: Some(user.clinic_id),
            role: user.role.into(),
            is_active: user.is_active,
            permissions: user.permissions.clone(),
        }
    }

    /// Constrói um chamador de operador da plataforma
    pub fn operator(id: Uuid) -> Self {
        Self {
            id,
            clinic_id: None,
            role: Role::CoreAdmin,
            is_active: true,
            permissions: PermissionSet::Full,
        }
    }
}
