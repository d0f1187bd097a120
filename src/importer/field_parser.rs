// ==========================================
// 批量导入管道 - 字段解析与类型转换
// ==========================================
// 职责: 原始字符串 → 强类型值，失败返回 FieldError
// 约定: 每个函数只处理一个字段，由校验器负责汇总，不短路
// ==========================================

use regex::Regex;
use std::fmt::Display;
use thiserror::Error;

/// 字段级错误（归因到单个字段）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// 必填字段缺失
    pub fn missing(field: &str) -> Self {
        Self::new(field, format!("Missing required field: {}", field))
    }
}

/// 布尔值可接受的写法（大小写不敏感）
pub const TRUE_TOKENS: [&str; 4] = ["true", "1", "yes", "t"];
pub const FALSE_TOKENS: [&str; 4] = ["false", "0", "no", "f"];

/// 解析整数
pub fn parse_int(field: &str, raw: &str) -> Result<i64, FieldError> {
    raw.trim().parse::<i64>().map_err(|_| {
        FieldError::new(
            field,
            format!("Invalid {}: {} (must be an integer)", field, raw),
        )
    })
}

/// 解析十进制小数（不接受指数写法与 NaN/inf）
pub fn parse_decimal(field: &str, raw: &str) -> Result<f64, FieldError> {
    let trimmed = raw.trim();
    let well_formed = !trimmed.is_empty()
        && trimmed
            .trim_start_matches(['-', '+'])
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.')
        && trimmed.matches('.').count() <= 1;

    let invalid = || {
        FieldError::new(
            field,
            format!("Invalid {}: {} (must be a number)", field, raw),
        )
    };

    if !well_formed {
        return Err(invalid());
    }
    trimmed.parse::<f64>().map_err(|_| invalid())
}

/// 解析浮点数（坐标等，仅接受有限值）
pub fn parse_float(field: &str, raw: &str) -> Result<f64, FieldError> {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(FieldError::new(
            field,
            format!("Invalid {}: {} (must be a number)", field, raw),
        )),
    }
}

/// 解析布尔值
pub fn parse_bool(field: &str, raw: &str) -> Result<bool, FieldError> {
    let lowered = raw.trim().to_lowercase();
    if TRUE_TOKENS.contains(&lowered.as_str()) {
        Ok(true)
    } else if FALSE_TOKENS.contains(&lowered.as_str()) {
        Ok(false)
    } else {
        Err(FieldError::new(
            field,
            format!("Invalid {}: {} (must be boolean)", field, raw),
        ))
    }
}

/// 数值范围校验（闭区间，边界可选）
pub fn check_range<T>(field: &str, value: T, min: Option<T>, max: Option<T>) -> Result<T, FieldError>
where
    T: PartialOrd + Display + Copy,
{
    let below = min.map(|m| value < m).unwrap_or(false);
    let above = max.map(|m| value > m).unwrap_or(false);
    if !below && !above {
        return Ok(value);
    }

    let message = match (min, max) {
        (Some(lo), Some(hi)) => format!(
            "Invalid {}: {} (must be between {} and {})",
            field, value, lo, hi
        ),
        (Some(lo), None) => format!("{} must be at least {}, got {}", field, lo, value),
        (None, Some(hi)) => format!("{} must be at most {}, got {}", field, hi, value),
        (None, None) => unreachable!("range check without bounds never fails"),
    };
    Err(FieldError::new(field, message))
}

/// 非负计数
pub fn check_non_negative(field: &str, value: i64) -> Result<i64, FieldError> {
    if value < 0 {
        Err(FieldError::new(field, format!("{} cannot be negative", field)))
    } else {
        Ok(value)
    }
}

/// 枚举值校验
pub fn parse_enum<T>(
    field: &str,
    raw: &str,
    parse: impl Fn(&str) -> Option<T>,
    allowed: &[&str],
) -> Result<T, FieldError> {
    parse(raw).ok_or_else(|| {
        FieldError::new(
            field,
            format!(
                "Invalid {}: {}. Must be one of: {}",
                field,
                raw,
                allowed.join(", ")
            ),
        )
    })
}

/// 格式校验（正则）
pub fn check_pattern<'a>(
    field: &str,
    raw: &'a str,
    pattern: &Regex,
    expected: &str,
) -> Result<&'a str, FieldError> {
    if pattern.is_match(raw) {
        Ok(raw)
    } else {
        Err(FieldError::new(
            field,
            format!(
                "Invalid {} format: {}. Expected format: {}",
                field, raw, expected
            ),
        ))
    }
}

/// 最大长度校验（按字符计）
pub fn check_max_len<'a>(field: &str, raw: &'a str, max: usize) -> Result<&'a str, FieldError> {
    if raw.chars().count() > max {
        Err(FieldError::new(
            field,
            format!("{} too long (max {} characters): {}", field, max, raw),
        ))
    } else {
        Ok(raw)
    }
}
