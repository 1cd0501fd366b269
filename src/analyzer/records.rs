//! JSON-lines record source and message sink.

use crate::analyzer::Record;
use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

/// Path meaning stdin / stdout.
pub const STDIO: &str = "-";

/// Read one JSON object per line. Blank lines are skipped.
pub async fn read_records<R: AsyncBufRead + Unpin>(reader: R) -> Result<Vec<Record>> {
    let mut lines = reader.lines();
    let mut records = Vec::new();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value =
            serde_json::from_str(line).with_context(|| format!("line {line_no}: invalid JSON"))?;
        match value {
            Value::Object(map) => records.push(map),
            _ => bail!("line {line_no}: expected a JSON object"),
        }
    }
    Ok(records)
}

/// Read records from a file, or from stdin when `path` is `-`.
pub async fn read_records_from(path: &str) -> Result<Vec<Record>> {
    if path == STDIO {
        read_records(BufReader::new(tokio::io::stdin())).await
    } else {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("failed to open input: {path}"))?;
        read_records(BufReader::new(file))
            .await
            .with_context(|| format!("failed to read records from {path}"))
    }
}

/// Write each item as one JSON line.
pub async fn write_lines<W: AsyncWrite + Unpin, T: Serialize>(
    writer: W,
    items: &[T],
) -> Result<()> {
    let mut writer = BufWriter::new(writer);
    for item in items {
        let mut line = serde_json::to_vec(item)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Write items to a file, or to stdout when `path` is `-`.
pub async fn write_lines_to<T: Serialize>(path: &str, items: &[T]) -> Result<()> {
    if path == STDIO {
        write_lines(tokio::io::stdout(), items).await
    } else {
        let file = tokio::fs::File::create(path)
            .await
            .with_context(|| format!("failed to create output: {path}"))?;
        write_lines(file, items).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_read_records_skips_blank_lines() {
        let input = b"{\"uid\":\"C1\",\"duration\":1.5}\n\n  \n{\"uid\":\"C2\",\"duration\":2}\n";
        let records = read_records(&input[..]).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["uid"], json!("C2"));
    }

    #[tokio::test]
    async fn test_read_records_rejects_non_objects() {
        let err = read_records(&b"{\"a\":1}\n[1,2]\n"[..]).await.unwrap_err();
        assert!(err.to_string().contains("line 2"));

        let err = read_records(&b"{not json\n"[..]).await.unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[tokio::test]
    async fn test_write_lines() {
        let mut out = Vec::new();
        write_lines(&mut out, &[json!({"score": 1}), json!({"score": 0})]).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "{\"score\":1}\n{\"score\":0}\n");
    }

    #[tokio::test]
    async fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let path = path.to_str().unwrap();
        write_lines_to(path, &[json!({"uid": "C1", "duration": 0.5})]).await.unwrap();
        let records = read_records_from(path).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["duration"], json!(0.5));
    }
}
