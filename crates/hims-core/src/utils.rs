//! 通用工具函数

use chrono::Utc;
use uuid::Uuid;

/// 生成住院流水号（用于日志与对外单据展示，内部主键仍为Uuid）
pub fn generate_admission_number() -> String {
    format!(
        "ADM-{}-{}",
        Utc::now().format("%Y%m%d"),
        &Uuid::new_v4().simple().to_string()[..8]
    )
}

/// 校验必填文本字段非空白
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_admission_number() {
        let number = generate_admission_number();
        assert!(number.starts_with("ADM-"));
        assert_eq!(number.split('-').count(), 3);
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(""));
        assert!(is_blank("   "));
        assert!(!is_blank("急性阑尾炎"));
    }
}
