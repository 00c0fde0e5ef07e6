//! .env の読み書き

use std::collections::BTreeMap;

/// .env の内容をパース
///
/// 1行目から順に `KEY=VALUE` を読みます。`export ` 接頭辞、`#` コメント、
/// ダブルクォート (エスケープあり)、シングルクォート (エスケープなし) に対応します。
/// エラー時は (行番号, 理由) を返します。
pub fn parse_dotenv(content: &str) -> Result<BTreeMap<String, String>, (usize, String)> {
    let mut values = BTreeMap::new();

    for (index, raw_line) in content.lines().enumerate() {
        let line_no = index + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, raw_value)) = line.split_once('=') else {
            return Err((line_no, format!("'=' がありません: {}", line)));
        };

        let key = key.trim();
        if key.is_empty() {
            return Err((line_no, "キーが空です".to_string()));
        }

        let value = parse_value(raw_value.trim()).map_err(|msg| (line_no, msg))?;
        values.insert(key.to_string(), value);
    }

    Ok(values)
}

fn parse_value(raw: &str) -> Result<String, String> {
    if let Some(rest) = raw.strip_prefix('"') {
        let mut value = String::with_capacity(rest.len());
        let mut chars = rest.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some('n') => value.push('\n'),
                    Some('r') => value.push('\r'),
                    Some(other) => value.push(other),
                    None => return Err("エスケープが途中で終わっています".to_string()),
                },
                '"' => return Ok(value),
                other => value.push(other),
            }
        }
        return Err("閉じていないダブルクォート".to_string());
    }

    if let Some(rest) = raw.strip_prefix('\'') {
        return rest
            .find('\'')
            .map(|end| rest[..end].to_string())
            .ok_or_else(|| "閉じていないシングルクォート".to_string());
    }

    // クォートなしの値は行内コメントを除去
    let value = match raw.find(" #") {
        Some(pos) => &raw[..pos],
        None => raw,
    };
    Ok(value.trim_end().to_string())
}

/// キー順に .env 形式へ書き出し
pub fn serialize_dotenv(values: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in values {
        out.push_str(key);
        out.push('=');
        out.push_str(&format_value(value));
        out.push('\n');
    }
    out
}

fn format_value(value: &str) -> String {
    // 整数はそのまま。ただし先頭ゼロ付きは読み戻しで数値扱いされないようクォートする
    let is_plain_integer = !value.is_empty()
        && value.chars().all(|c| c.is_ascii_digit())
        && !(value.len() > 1 && value.starts_with('0'));
    if is_plain_integer {
        return value.to_string();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '$' => quoted.push_str("\\$"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let content = "# comment\nAZURE_ENV_NAME=\"dev\"\nexport PORT=8080\nEMPTY=\n";
        let values = parse_dotenv(content).unwrap();
        assert_eq!(values["AZURE_ENV_NAME"], "dev");
        assert_eq!(values["PORT"], "8080");
        assert_eq!(values["EMPTY"], "");
    }

    #[test]
    fn test_parse_quotes() {
        let content = "A=\"line1\\nline2\"\nB='raw \\n value'\nC=plain # trailing\n";
        let values = parse_dotenv(content).unwrap();
        assert_eq!(values["A"], "line1\nline2");
        assert_eq!(values["B"], "raw \\n value");
        assert_eq!(values["C"], "plain");
    }

    #[test]
    fn test_parse_error_reports_line() {
        let err = parse_dotenv("A=1\nnot a pair\n").unwrap_err();
        assert_eq!(err.0, 2);
    }

    #[test]
    fn test_serialize_leading_zero_is_quoted() {
        let mut values = BTreeMap::new();
        values.insert("ZIP".to_string(), "01234".to_string());
        values.insert("COUNT".to_string(), "42".to_string());
        values.insert("URL".to_string(), "https://x/${y}".to_string());

        let out = serialize_dotenv(&values);
        assert!(out.contains("ZIP=\"01234\"\n"));
        assert!(out.contains("COUNT=42\n"));
        assert!(out.contains("URL=\"https://x/\\${y}\"\n"));

        let reparsed = parse_dotenv(&out).unwrap();
        assert_eq!(reparsed, values);
    }
}
