use std::sync::LazyLock;

use regex::Regex;
use sqlx::PgPool;

use crate::routes::user::model::RealNameInfo;
use crate::utils::retry::with_retry;

static IDCARD_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{17}[\dXx]$|^\d{15}$").unwrap());

/// 18 位身份证前 17 位的加权因子
const IDCARD_WEIGHTS: [u32; 17] = [7, 9, 10, 5, 8, 4, 2, 1, 6, 3, 7, 9, 10, 5, 8, 4, 2];

/// 加权和 mod 11 对应的校验字符
const IDCARD_CHECK_DIGITS: &[u8] = b"10X98765432";

/// 身份证号校验：18 位带 mod-11 校验位，15 位老号段只查格式
pub fn validate_id_card(id_card: &str) -> bool {
    if !IDCARD_REGEX.is_match(id_card) {
        return false;
    }

    if id_card.len() == 18 {
        let digits: Vec<u32> = id_card[..17]
            .chars()
            .filter_map(|c| c.to_digit(10))
            .collect();
        if digits.len() != 17 {
            return false;
        }
        let total: u32 = digits
            .iter()
            .zip(IDCARD_WEIGHTS.iter())
            .map(|(d, w)| d * w)
            .sum();
        let expected = IDCARD_CHECK_DIGITS[(total % 11) as usize] as char;
        return id_card
            .chars()
            .last()
            .is_some_and(|c| c.to_ascii_uppercase() == expected);
    }

    true
}

/// 姓名脱敏：保留首字，其余打星
pub fn mask_real_name(real_name: &str) -> String {
    let name = real_name.trim();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => {
            let rest = chars.count();
            if rest == 0 {
                name.to_string()
            } else {
                format!("{}{}", first, "*".repeat(rest))
            }
        }
        None => String::new(),
    }
}

/// 身份证脱敏：保留前 3 位和后 3 位
pub fn mask_id_card(id_card: &str) -> String {
    let id = id_card.trim();
    if id.len() < 7 {
        return id.to_string();
    }
    format!("{}{}{}", &id[..3], "*".repeat(id.len() - 6), &id[id.len() - 3..])
}

/// 实名认证前置条件：手机已验证且尚未实名
fn can_verify(phone_verified: bool, realname_verified: bool) -> bool {
    phone_verified && !realname_verified
}

/// 实名认证
///
/// 身份证校验通过且前置条件满足才写入，行级锁事务内完成判定与
/// 写入，拒绝路径零写入。实名是一次性的终态变更。
pub async fn verify(
    pool: &PgPool,
    username: &str,
    real_name: &str,
    id_card: &str,
) -> Result<Option<RealNameInfo>, sqlx::Error> {
    if !validate_id_card(id_card) {
        return Ok(None);
    }

    let mut tx = pool.begin().await?;

    let row: Option<(bool, bool)> = sqlx::query_as(
        "SELECT phone_verified, realname_verified FROM users WHERE username = $1 FOR UPDATE",
    )
    .bind(username)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((phone_verified, realname_verified)) = row else {
        return Ok(None);
    };
    if !can_verify(phone_verified, realname_verified) {
        return Ok(None);
    }

    sqlx::query(
        r#"
        UPDATE users
        SET real_name         = $1,
            id_card           = $2,
            realname_verified = TRUE
        WHERE username = $3
        "#,
    )
    .bind(real_name)
    .bind(id_card)
    .bind(username)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(RealNameInfo {
        realname: real_name.to_string(),
        idcard: id_card.to_string(),
    }))
}

/// 脱敏后的实名信息
pub async fn get_masked(
    pool: &PgPool,
    username: &str,
) -> Result<Option<RealNameInfo>, sqlx::Error> {
    let row = with_retry("查询实名信息", || {
        let pool = pool.clone();
        let username = username.to_string();
        async move {
            sqlx::query_as::<_, (Option<String>, Option<String>)>(
                "SELECT real_name, id_card FROM users WHERE username = $1",
            )
            .bind(username)
            .fetch_optional(&pool)
            .await
        }
    })
    .await?;

    Ok(row.map(|(real_name, id_card)| RealNameInfo {
        realname: mask_real_name(real_name.as_deref().unwrap_or("")),
        idcard: mask_id_card(id_card.as_deref().unwrap_or("")),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_18_digit_card_passes_checksum() {
        assert!(validate_id_card("11010519491231002X"));
        assert!(validate_id_card("11010519491231002x")); // 校验位大小写不敏感
    }

    #[test]
    fn mutated_check_digit_fails() {
        assert!(!validate_id_card("110105194912310021"));
        assert!(!validate_id_card("110105194912310029"));
    }

    #[test]
    fn legacy_15_digit_card_skips_checksum() {
        assert!(validate_id_card("110105491231002"));
    }

    #[test]
    fn malformed_cards_are_rejected() {
        assert!(!validate_id_card(""));
        assert!(!validate_id_card("1234"));
        assert!(!validate_id_card("1101051949123100XX"));
        assert!(!validate_id_card("1101051949123100234")); // 19 位
    }

    #[test]
    fn name_masking_keeps_first_char() {
        assert_eq!(mask_real_name("张三"), "张*");
        assert_eq!(mask_real_name("欧阳锋"), "欧**");
        assert_eq!(mask_real_name("王"), "王");
    }

    #[test]
    fn id_card_masking_keeps_ends() {
        assert_eq!(mask_id_card("11010519491231002X"), "110************02X");
        assert_eq!(mask_id_card("110105491231002"), "110*********002");
    }

    #[test]
    fn verification_requires_verified_phone() {
        assert!(!can_verify(false, false));
    }

    #[test]
    fn verification_is_one_shot() {
        assert!(can_verify(true, false));
        assert!(!can_verify(true, true));
    }
}
