//! `multipart/form-data` body parsing.

use anyhow::{anyhow, Result};

use super::http::find_subsequence;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FormPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Boundary parameter of a `multipart/form-data` content type.
pub(crate) fn boundary_from_content_type(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';');
    let mime = params.next()?.trim();
    if !mime.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params.find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}

pub(crate) fn parse_form_data(body: &[u8], boundary: &str) -> Result<Vec<FormPart>> {
    let delimiter = format!("--{boundary}").into_bytes();
    let separator = format!("\r\n--{boundary}").into_bytes();

    let mut pos = find_subsequence(body, &delimiter)
        .ok_or_else(|| anyhow!("multipart body has no opening boundary"))?
        + delimiter.len();
    let mut parts = Vec::new();
    loop {
        let rest = body
            .get(pos..)
            .ok_or_else(|| anyhow!("multipart body truncated"))?;
        if rest.starts_with(b"--") {
            break;
        }
        let rest = rest
            .strip_prefix(b"\r\n")
            .ok_or_else(|| anyhow!("malformed multipart boundary line"))?;
        let start = body.len() - rest.len();

        let head_len = find_subsequence(rest, b"\r\n\r\n")
            .ok_or_else(|| anyhow!("multipart part has no header terminator"))?;
        let head = String::from_utf8_lossy(&rest[..head_len]);
        let content_start = start + head_len + 4;
        let content_len = body
            .get(content_start..)
            .and_then(|content| find_subsequence(content, &separator))
            .ok_or_else(|| anyhow!("multipart part has no closing boundary"))?;
        let content_end = content_start + content_len;

        let mut part = FormPart {
            name: String::new(),
            filename: None,
            content_type: None,
            data: body[content_start..content_end].to_vec(),
        };
        for line in head.split("\r\n") {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            if key.eq_ignore_ascii_case("content-disposition") {
                part.name = disposition_param(value, "name").unwrap_or_default();
                part.filename = disposition_param(value, "filename");
            } else if key.eq_ignore_ascii_case("content-type") {
                part.content_type = Some(value.trim().to_string());
            }
        }
        parts.push(part);

        pos = content_end + separator.len();
    }
    Ok(parts)
}

fn disposition_param(value: &str, key: &str) -> Option<String> {
    value.split(';').skip(1).find_map(|param| {
        let (k, v) = param.split_once('=')?;
        if !k.trim().eq_ignore_ascii_case(key) {
            return None;
        }
        let v = v.trim();
        let v = v
            .strip_prefix('"')
            .and_then(|inner| inner.strip_suffix('"'))
            .unwrap_or(v);
        Some(v.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_boundary() {
        assert_eq!(
            boundary_from_content_type("multipart/form-data; boundary=----abc123").as_deref(),
            Some("----abc123")
        );
        assert_eq!(
            boundary_from_content_type(r#"Multipart/Form-Data; charset=utf-8; boundary="x y""#)
                .as_deref(),
            Some("x y")
        );
        assert_eq!(boundary_from_content_type("application/json"), None);
    }

    #[test]
    fn parses_file_and_text_fields() -> Result<()> {
        let body = b"--XYZ\r\n\
Content-Disposition: form-data; name=\"note\"\r\n\r\n\
hello\r\n\
--XYZ\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"car.JPG\"\r\n\
Content-Type: image/jpeg\r\n\r\n\
\xff\xd8binary\r\n--not-a-boundary\xff\xd9\r\n\
--XYZ--\r\n";
        let parts = parse_form_data(body, "XYZ")?;
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].name, "note");
        assert_eq!(parts[0].filename, None);
        assert_eq!(parts[0].data, b"hello");
        assert_eq!(parts[1].name, "file");
        assert_eq!(parts[1].filename.as_deref(), Some("car.JPG"));
        assert_eq!(parts[1].content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(parts[1].data, b"\xff\xd8binary\r\n--not-a-boundary\xff\xd9");
        Ok(())
    }

    #[test]
    fn empty_filename_is_preserved() -> Result<()> {
        let body = b"--b\r\nContent-Disposition: form-data; name=\"file\"; filename=\"\"\r\n\r\n\r\n--b--";
        let parts = parse_form_data(body, "b")?;
        assert_eq!(parts[0].filename.as_deref(), Some(""));
        assert!(parts[0].data.is_empty());
        Ok(())
    }

    #[test]
    fn rejects_missing_closing_boundary() {
        let body = b"--b\r\nContent-Disposition: form-data; name=\"file\"\r\n\r\ndata";
        assert!(parse_form_data(body, "b").is_err());
    }
}
