// ==========================================
// 批量导入管道 - 表格文件解码器
// ==========================================
// 支持: Excel (.xlsx/.xls) / CSV (.csv)
// 输出: DecodedFile { headers, rows: Vec<RawRow> }
// 结构性检查: 文件大小 / 空文件 / 行数上限
// 表头缺失检查由 schema 决定（见 DecodedFile::missing_columns）
// ==========================================

use crate::domain::record::RawRow;
use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto_from_rs, Reader};
use csv::{ReaderBuilder, StringRecord};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// 文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Excel,
}

impl FileFormat {
    /// 按文件名扩展名识别（大小写不敏感）
    pub fn detect(file_name: &str) -> ImportResult<Self> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "csv" => Ok(FileFormat::Csv),
            "xlsx" | "xls" => Ok(FileFormat::Excel),
            _ => Err(ImportError::UnsupportedFormat(if ext.is_empty() {
                file_name.to_string()
            } else {
                ext
            })),
        }
    }
}

// ==========================================
// DecodedFile - 解码结果
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFile {
    /// 规范化表头（trim + 小写），保持文件中的顺序
    pub headers: Vec<String>,
    /// 非空数据行；row_number 按物理数据行计数（空白行跳过但占号）
    pub rows: Vec<RawRow>,
    /// 跳过的空白行数
    pub blank_rows: usize,
}

impl DecodedFile {
    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }

    /// 缺失的必填列（按 required 顺序）
    pub fn missing_columns<S: AsRef<str>>(&self, required: &[S]) -> Vec<String> {
        required
            .iter()
            .map(AsRef::as_ref)
            .filter(|col| !self.headers.iter().any(|h| h == col))
            .map(str::to_string)
            .collect()
    }
}

/// 表头规范化（trim + 小写，去 BOM）
pub(crate) fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}').trim().to_lowercase()
}

/// 按表头把一行单元格组装为 RawRow；无表头的列丢弃
fn build_row<I>(row_number: usize, headers: &[String], cells: I) -> RawRow
where
    I: IntoIterator<Item = String>,
{
    let mut row = RawRow::new(row_number);
    for (col_idx, value) in cells.into_iter().enumerate() {
        if let Some(header) = headers.get(col_idx) {
            if header.is_empty() {
                continue;
            }
            row.push(header.clone(), value);
        }
    }
    row
}

// ==========================================
// TabularDecoder Trait
// ==========================================
pub trait TabularDecoder: Send + Sync {
    /// 解码内存中的文件内容
    fn decode(&self, content: &[u8]) -> ImportResult<DecodedFile>;
}

// ==========================================
// CSV 解码器
// ==========================================
pub struct CsvDecoder;

impl TabularDecoder for CsvDecoder {
    fn decode(&self, content: &[u8]) -> ImportResult<DecodedFile> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .from_reader(content);

        let header_record = reader.headers()?.clone();
        let headers: Vec<String> = header_record.iter().map(normalize_header).collect();

        // csv 会静默跳过空行；按记录起始行号补回被跳过的行，保证 row_number 对应文件中的物理数据行
        let mut next_line = record_line(&header_record, 1) + line_span(&header_record);
        let mut row_number = 0;
        let mut rows = Vec::new();
        let mut blank_rows = 0;
        for result in reader.records() {
            let record = result?;
            let line = record_line(&record, next_line);
            let skipped = line.saturating_sub(next_line) as usize;
            blank_rows += skipped;
            row_number += skipped + 1;
            next_line = line + line_span(&record);

            let row = build_row(row_number, &headers, record.iter().map(str::to_string));

            // 跳过完全空白的行
            if row.is_blank() {
                blank_rows += 1;
                continue;
            }
            rows.push(row);
        }

        Ok(DecodedFile {
            headers,
            rows,
            blank_rows,
        })
    }
}

/// 记录起始行号（1 起）；无位置信息时使用 fallback
fn record_line(record: &StringRecord, fallback: u64) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(fallback)
}

/// 记录占用的物理行数（引号内换行）
fn line_span(record: &StringRecord) -> u64 {
    1 + record.iter().map(|field| field.matches('\n').count() as u64).sum::<u64>()
}

// ==========================================
// Excel 解码器（仅读取第一个工作表）
// ==========================================
pub struct ExcelDecoder;

impl TabularDecoder for ExcelDecoder {
    fn decode(&self, content: &[u8]) -> ImportResult<DecodedFile> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(content.to_vec()))?;

        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::ExcelParseError("workbook has no sheets".to_string()))?;

        let range = workbook.worksheet_range(&sheet_name)?;

        let mut sheet_rows = range.rows();
        let headers: Vec<String> = match sheet_rows.next() {
            Some(header_row) => header_row
                .iter()
                .map(|cell| normalize_header(&cell.to_string()))
                .collect(),
            None => Vec::new(),
        };

        let mut rows = Vec::new();
        let mut blank_rows = 0;
        for (row_idx, data_row) in sheet_rows.enumerate() {
            let row = build_row(
                row_idx + 1,
                &headers,
                data_row.iter().map(|cell| cell.to_string()),
            );

            if row.is_blank() {
                blank_rows += 1;
                continue;
            }
            rows.push(row);
        }

        Ok(DecodedFile {
            headers,
            rows,
            blank_rows,
        })
    }
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择 + 结构性限制）
// ==========================================
pub struct UniversalFileParser {
    max_file_bytes: usize,
    max_rows: usize,
}

impl UniversalFileParser {
    pub fn new(max_file_bytes: usize, max_rows: usize) -> Self {
        Self {
            max_file_bytes,
            max_rows,
        }
    }

    /// 上传大小检查（受理前调用，无需解码）
    pub fn check_size(&self, size: usize) -> ImportResult<()> {
        if size > self.max_file_bytes {
            return Err(ImportError::FileTooLarge {
                size,
                max: self.max_file_bytes,
            });
        }
        Ok(())
    }

    /// 解码内存中的文件
    ///
    /// # 参数
    /// - file_name: 原始文件名（用于识别格式）
    /// - content: 文件字节
    ///
    /// # 返回
    /// - Ok(DecodedFile): 至少一行数据且未超出行数上限
    /// - Err(ImportError): 格式不支持 / 超限 / 空文件 / 解析失败
    pub fn decode_bytes(&self, file_name: &str, content: &[u8]) -> ImportResult<DecodedFile> {
        self.check_size(content.len())?;

        let decoded = match FileFormat::detect(file_name)? {
            FileFormat::Csv => CsvDecoder.decode(content)?,
            FileFormat::Excel => ExcelDecoder.decode(content)?,
        };

        if decoded.headers.iter().all(|h| h.is_empty()) || decoded.rows.is_empty() {
            return Err(ImportError::EmptyFile);
        }

        if decoded.total_rows() > self.max_rows {
            return Err(ImportError::TooManyRows {
                rows: decoded.total_rows(),
                max: self.max_rows,
            });
        }

        debug!(
            file_name = %file_name,
            rows = decoded.total_rows(),
            blank_rows = decoded.blank_rows,
            columns = decoded.headers.len(),
            "文件解码完成"
        );

        Ok(decoded)
    }

    /// 从磁盘读取并解码（CLI 使用）
    pub fn decode_path<P: AsRef<Path>>(&self, file_path: P) -> ImportResult<DecodedFile> {
        let path = file_path.as_ref();
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let content = std::fs::read(path)?;
        self.decode_bytes(&file_name, &content)
    }
}
