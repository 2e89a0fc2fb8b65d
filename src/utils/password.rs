use std::fmt::Write;

use rand::Rng;
use sha2::{Digest, Sha256};

/// 盐默认长度
pub const SALT_LENGTH: usize = 8;

const SALT_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// 生成随机盐，大写字母加数字
pub fn generate_salt(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| SALT_CHARS[rng.gen_range(0..SALT_CHARS.len())] as char)
        .collect()
}

pub fn sha256_hex(data: &str) -> String {
    let digest = Sha256::digest(data.as_bytes());
    digest.iter().fold(String::with_capacity(64), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

/// 加盐哈希：hex(sha256(hex(sha256(password)) + salt))
/// 两轮必须使用同一摘要与同一编码，否则与存量口令不兼容
pub fn hash_password(password: &str, salt: &str) -> String {
    let first_hash = sha256_hex(password);
    sha256_hex(&format!("{first_hash}{salt}"))
}

/// 定长比较，避免早退带来的时间差
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_is_deterministic() {
        assert_eq!(hash_password("p@ssw0rd", "AB12CD34"), hash_password("p@ssw0rd", "AB12CD34"));
    }

    #[test]
    fn different_salts_produce_different_hashes() {
        assert_ne!(hash_password("p@ssw0rd", "AB12CD34"), hash_password("p@ssw0rd", "EF56GH78"));
    }

    #[test]
    fn hash_is_lowercase_hex() {
        let h = hash_password("password", "SALT");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn two_rounds_compose_over_first_hex_digest() {
        let inner = sha256_hex("password");
        assert_eq!(hash_password("password", "SALT"), sha256_hex(&format!("{inner}SALT")));
    }

    #[test]
    fn salt_uses_expected_alphabet_and_length() {
        let salt = generate_salt(SALT_LENGTH);
        assert_eq!(salt.len(), SALT_LENGTH);
        assert!(salt.bytes().all(|b| SALT_CHARS.contains(&b)));
    }

    #[test]
    fn constant_time_eq_matches_equality() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
    }
}
