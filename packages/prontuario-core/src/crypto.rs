//! Hashing de credenciais e geração de tokens
//!
//! Implementa o colaborador de hashing unidirecional (Argon2id com fator de
//! trabalho parametrizável) e a geração de tokens opacos de verificação.

use crate::error::ServiceError;
use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, Params, PasswordHasher, PasswordVerifier};
use rand::RngCore;

/// Fator de trabalho do Argon2id
#[derive(Debug, Clone, Copy)]
pub struct HashParams {
    /// Memória em KiB
    pub memory_kib: u32,
    /// Número de iterações
    pub iterations: u32,
    /// Grau de paralelismo
    pub parallelism: u32,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

fn hasher(params: HashParams) -> Result<Argon2<'static>, ServiceError> {
    let params = Params::new(params.memory_kib, params.iterations, params.parallelism, None)
        .map_err(|e| ServiceError::Upstream(anyhow::anyhow!("parâmetros de hash inválidos: {}", e)))?;
    Ok(Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        params,
    ))
}

/// Gera o hash unidirecional de uma senha
pub fn hash_password(password: &str, params: HashParams) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher(params)?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ServiceError::Upstream(anyhow::anyhow!("falha ao gerar hash: {}", e)))?;
    Ok(hash.to_string())
}

/// Verifica uma senha contra um hash armazenado
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, ServiceError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| ServiceError::Upstream(anyhow::anyhow!("hash armazenado inválido: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Erros de política de senha: mínimo de 8 caracteres, ao menos uma
/// maiúscula, uma minúscula, um dígito e um símbolo
pub fn password_policy_errors(password: &str) -> Vec<crate::error::FieldError> {
    use crate::error::FieldError;

    let mut errors = Vec::new();
    if password.len() < 8 {
        errors.push(FieldError::new("password", "A senha deve ter pelo menos 8 caracteres"));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push(FieldError::new("password", "A senha deve conter letra maiúscula"));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push(FieldError::new("password", "A senha deve conter letra minúscula"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push(FieldError::new("password", "A senha deve conter dígito"));
    }
    if password.chars().all(|c| c.is_ascii_alphanumeric()) {
        errors.push(FieldError::new("password", "A senha deve conter símbolo"));
    }
    errors
}

/// Gera um token opaco de 32 bytes em hexadecimal
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() -> Result<(), ServiceError> {
        let hash = hash_password("Senha-forte1!", HashParams::default())?;

        assert!(verify_password("Senha-forte1!", &hash)?);
        assert!(!verify_password("senha-errada", &hash)?);
        Ok(())
    }

    #[test]
    fn test_hashes_are_salted() -> Result<(), ServiceError> {
        let params = HashParams::default();
        let a = hash_password("mesma-senha", params)?;
        let b = hash_password("mesma-senha", params)?;
        assert_ne!(a, b);
        Ok(())
    }

    #[test]
    fn test_password_policy() {
        // Senha forte passa sem erros
        assert!(password_policy_errors("Senha-forte1!").is_empty());

        // Senha fraca acumula todos os erros aplicáveis de uma vez
        let errors = password_policy_errors("abc");
        assert!(errors.len() >= 3);

        assert!(!password_policy_errors("semdigito-Aa").is_empty());
        assert!(!password_policy_errors("SemSimbolo1a").is_empty());
        assert!(!password_policy_errors("sem-maiuscula1").is_empty());
    }

    #[test]
    fn test_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }
}
