//! Prontuário Core - Núcleo de regras do prontuário eletrônico
//!
//! Este núcleo implementa:
//! - Modelo de identidade e capacidades (papéis de clínica e de operador)
//! - Modelo de planos e direitos de uso (níveis free/starter/pro/enterprise)
//! - Porta de autorização consultada antes de toda operação mutante
//! - Registro de pacientes com exclusão lógica
//! - Livro de registros clínicos com motivos obrigatórios e trilha de auditoria
//! - Administração de funcionários sujeita ao limite do plano
//! - Ciclo de vida de assinaturas e cadastro de administradores
//!
//! Transporte HTTP, emissão de tokens de sessão e os formatos de fio dos
//! provedores de pagamento e e-mail ficam fora deste núcleo; eles entram
//! apenas como colaboradores atrás de traits.

pub mod authorize;
pub mod charts;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod patients;
pub mod plans;
pub mod registration;
pub mod staff;
pub mod subscription;

pub use error::{DenyReason, FieldError, ServiceError};
pub use identity::{Caller, Role};

#[cfg(test)]
pub(crate) mod test_support;
