//! Tesseract CLI engine
//!
//! Runs `tesseract stdin stdout -l <langs> tsv` with the page PNG piped in and
//! rebuilds text and mean word confidence from the TSV report.

use super::{Confidence, OcrEngine, OcrError, Recognized};
use crate::config::{is_language_code, DEFAULT_RENDER_DPI};
use async_trait::async_trait;
use image::DynamicImage;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// TSV `level` of word rows
const WORD_LEVEL: &str = "5";
const TSV_COLUMNS: usize = 12;

/// OCR engine backed by the tesseract executable.
///
/// The process has no deadline of its own: the caller's page budget bounds it,
/// and dropping the `recognize` future kills the process.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    command: String,
    dpi: u32,
}

impl TesseractEngine {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            dpi: DEFAULT_RENDER_DPI,
        }
    }

    /// Resolution hint passed along with rendered pages
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    /// Check if the executable can be launched
    pub async fn is_available(&self) -> bool {
        Command::new(&self.command)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, OcrError> {
        let mut png = Vec::new();
        image
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|e| OcrError::Encode(e.to_string()))?;
        Ok(png)
    }

    fn language_arg(languages: &[String]) -> Result<String, OcrError> {
        if languages.is_empty() {
            return Err(OcrError::UnsupportedLanguage("<none>".to_string()));
        }
        if let Some(bad) = languages.iter().find(|l| !is_language_code(l)) {
            return Err(OcrError::UnsupportedLanguage(bad.clone()));
        }
        Ok(languages.join("+"))
    }

    async fn run(&self, png: Vec<u8>, lang: &str) -> Result<String, OcrError> {
        let mut child = Command::new(&self.command)
            .args(["stdin", "stdout", "-l", lang, "--dpi"])
            .arg(self.dpi.to_string())
            .arg("tsv")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| OcrError::Launch(format!("{}: {}", self.command, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| OcrError::Launch("stdin not captured".to_string()))?;

        // Output is collected while the image is still being written.
        let feed = async move {
            let written = stdin.write_all(&png).await;
            drop(stdin);
            written
        };
        let (written, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|e| OcrError::Crashed(e.to_string()))?;

        if !output.status.success() {
            let err_text = String::from_utf8_lossy(&output.stderr);
            if err_text.contains("Failed loading language")
                || err_text.contains("Error opening data file")
            {
                return Err(OcrError::UnsupportedLanguage(lang.to_string()));
            }
            return Err(OcrError::Crashed(format!(
                "{}: {}",
                output.status,
                err_text.trim()
            )));
        }
        if let Err(e) = written {
            return Err(OcrError::Crashed(format!("failed to feed page image: {}", e)));
        }

        String::from_utf8(output.stdout).map_err(|e| OcrError::Output(e.to_string()))
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    async fn recognize(
        &self,
        image: &DynamicImage,
        languages: &[String],
    ) -> Result<Recognized, OcrError> {
        let lang = Self::language_arg(languages)?;
        let image = image.clone();
        let png = tokio::task::spawn_blocking(move || Self::encode_png(&image))
            .await
            .map_err(|e| OcrError::Encode(e.to_string()))??;
        let tsv = self.run(png, &lang).await?;
        parse_tsv(&tsv)
    }
}

/// Rebuild text and mean word confidence from a tesseract TSV report.
///
/// Words on the same line are joined by spaces, lines by newlines, and
/// paragraphs by a blank line. Rows with `conf == -1` carry no word and do
/// not count towards the mean.
pub fn parse_tsv(tsv: &str) -> Result<Recognized, OcrError> {
    let mut rows = tsv.lines().filter(|l| !l.trim().is_empty());

    match rows.next() {
        None => {
            return Ok(Recognized {
                text: String::new(),
                confidence: Confidence::unverified(),
            })
        }
        Some(header) if header.starts_with("level") => {}
        Some(other) => {
            return Err(OcrError::Output(format!(
                "missing TSV header, got {:?}",
                other.chars().take(40).collect::<String>()
            )))
        }
    }

    let mut text = String::new();
    let mut last_line: Option<(&str, &str, &str, &str)> = None;
    let mut conf_sum = 0.0f64;
    let mut conf_count = 0usize;

    for row in rows {
        let cols: Vec<&str> = row.splitn(TSV_COLUMNS, '\t').collect();
        if cols.len() < TSV_COLUMNS - 1 || cols[0] != WORD_LEVEL {
            continue;
        }
        let word = cols.get(11).map(|w| w.trim()).unwrap_or("");
        if word.is_empty() {
            continue;
        }

        let conf: f64 = cols[10]
            .trim()
            .parse()
            .map_err(|_| OcrError::Output(format!("bad confidence {:?}", cols[10])))?;
        if conf >= 0.0 {
            conf_sum += conf;
            conf_count += 1;
        }

        // (page, block, paragraph, line)
        let line_key = (cols[1], cols[2], cols[3], cols[4]);
        match last_line {
            Some(prev) if prev == line_key => text.push(' '),
            Some(prev) if (prev.0, prev.1, prev.2) == (line_key.0, line_key.1, line_key.2) => {
                text.push('\n')
            }
            Some(_) => text.push_str("\n\n"),
            None => {}
        }
        text.push_str(word);
        last_line = Some(line_key);
    }

    let confidence = if conf_count == 0 {
        Confidence::unverified()
    } else {
        Confidence::from_percent((conf_sum / conf_count as f64) as f32)
    };

    Ok(Recognized { text, confidence })
}
