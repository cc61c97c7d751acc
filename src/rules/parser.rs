//! Rules table parser.
//!
//! Rules files are CSV sheets exported from spreadsheets, so the parser
//! is deliberately tolerant: the header is located by its sentinel
//! columns rather than assumed to be the first record, records may be
//! shorter than the header, and unrecognized rows are skipped.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{GroupTagError, Result, RulesError};

use super::spec::{MatchOperator, ObjectType, RuleRow, RuleSet, ScopeColumn};

/// Sentinel column: object kind.
const COL_OBJECT_TYPE: &str = "ObjectType";

/// Sentinel column: name selector / IP specifier.
const COL_NAME: &str = "Name";

/// Sentinel column: match operator.
const COL_MATCH: &str = "Match";

/// Sentinel column: resolve-to-VM-list flag.
const COL_RESOLVE: &str = "Resolve";

/// Sentinel column: group-name override.
const COL_GROUP_NAME: &str = "GroupName";

/// Divider between the fixed columns and the tag scope columns.
const COL_SEPARATOR: &str = "_SEP_";

/// Marker for the optional row listing multi-tag scopes.
const MULTI_TAG_MARKER: &str = "MultiVMTagScope";

/// Parser for rules CSV files.
#[derive(Debug, Default)]
pub struct RulesParser;

/// Column positions resolved from the header record.
struct Layout {
    object_type: usize,
    name: usize,
    operator: usize,
    resolve: usize,
    group_name: usize,
    /// Scope columns as (record index, scope name) pairs. Blank header
    /// cells after the divider are ignored.
    scope_columns: Vec<(usize, String)>,
}

impl Layout {
    fn from_header(header: &csv::StringRecord) -> Result<Self> {
        let find = |column: &str| {
            header
                .iter()
                .position(|cell| cell.trim() == column)
                .ok_or_else(|| {
                    GroupTagError::Rules(RulesError::MissingColumn {
                        column: column.to_string(),
                    })
                })
        };

        let separator = find(COL_SEPARATOR)?;
        let scope_columns = header
            .iter()
            .enumerate()
            .skip(separator + 1)
            .filter_map(|(index, cell)| {
                let name = cell.trim();
                (!name.is_empty()).then(|| (index, name.to_string()))
            })
            .collect();

        Ok(Self {
            object_type: find(COL_OBJECT_TYPE)?,
            name: find(COL_NAME)?,
            operator: find(COL_MATCH)?,
            resolve: find(COL_RESOLVE)?,
            group_name: find(COL_GROUP_NAME)?,
            scope_columns,
        })
    }
}

/// Reads a cell, treating missing trailing cells as empty.
fn cell<'a>(record: &'a csv::StringRecord, index: usize) -> &'a str {
    record.get(index).unwrap_or("")
}

impl RulesParser {
    /// Creates a new rules parser.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Loads and parses a rules file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist, cannot be read, or
    /// does not contain a valid rules table.
    pub fn load_file(&self, path: &Path) -> Result<RuleSet> {
        if !path.exists() {
            return Err(RulesError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        debug!("Loading rules from: {}", path.display());
        let file = File::open(path)?;
        self.parse_reader(file)
    }

    /// Parses a rules table from any reader.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed CSV, a missing header record, or a
    /// header missing one of the sentinel columns.
    pub fn parse_reader<R: Read>(&self, reader: R) -> Result<RuleSet> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut records = Vec::new();
        for (index, result) in csv_reader.records().enumerate() {
            let record = result.map_err(|e| RulesError::parse_at(e.to_string(), index + 1))?;
            records.push(record);
        }

        Self::parse_records(&records)
    }

    fn parse_records(records: &[csv::StringRecord]) -> Result<RuleSet> {
        let header_pos = records
            .iter()
            .position(|record| record.iter().any(|cell| cell.trim() == COL_OBJECT_TYPE))
            .ok_or(RulesError::NoHeader)?;

        let layout = Layout::from_header(&records[header_pos])?;
        let multitag_scopes = Self::multitag_scopes(records);

        let scopes: Vec<ScopeColumn> = layout
            .scope_columns
            .iter()
            .map(|(_, name)| ScopeColumn {
                name: name.clone(),
                multitag: multitag_scopes.contains(name),
            })
            .collect();

        let mut rows = Vec::new();
        for (index, record) in records.iter().enumerate().skip(header_pos + 1) {
            let Some(object_type) = ObjectType::parse(cell(record, layout.object_type)) else {
                continue;
            };

            let group_name = cell(record, layout.group_name).trim();
            let tag_values = layout
                .scope_columns
                .iter()
                .map(|(column, _)| {
                    let value = cell(record, *column).trim();
                    (!value.is_empty()).then(|| value.to_string())
                })
                .collect();

            rows.push(RuleRow {
                object_type,
                name: cell(record, layout.name).trim().to_string(),
                operator: MatchOperator::parse(cell(record, layout.operator)),
                resolve: cell(record, layout.resolve)
                    .trim()
                    .eq_ignore_ascii_case("true"),
                group_name: (!group_name.is_empty()).then(|| group_name.to_string()),
                tag_values,
                line: index + 1,
            });
        }

        if rows.is_empty() {
            warn!("Rules table contains no planning rows");
        }

        Ok(RuleSet { scopes, rows })
    }

    /// Collects the scope names declared by a `MultiVMTagScope` record,
    /// which may appear anywhere in the file.
    fn multitag_scopes(records: &[csv::StringRecord]) -> HashSet<String> {
        records
            .iter()
            .find_map(|record| {
                record
                    .iter()
                    .position(|cell| cell.trim() == MULTI_TAG_MARKER)
                    .map(|marker| {
                        record
                            .iter()
                            .skip(marker + 1)
                            .map(str::trim)
                            .filter(|name| !name.is_empty())
                            .map(String::from)
                            .collect()
                    })
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = "\
ObjectType,Name,Match,Resolve,GroupName,_SEP_,Env,App
MultiVMTagScope,,,,,,,App
vm,web,startswith,false,Web,_SEP_,prod,frontend
ip,10.0.0.0/24,,true,,_SEP_,prod,
segment,app-seg,contains,FALSE,,_SEP_,,backend
";

    fn parse(input: &str) -> RuleSet {
        RulesParser::new().parse_reader(input.as_bytes()).unwrap()
    }

    #[test]
    fn test_parses_scopes_and_multitag_flags() {
        let rules = parse(SAMPLE);

        assert_eq!(rules.scopes.len(), 2);
        assert_eq!(rules.scopes[0].name, "Env");
        assert!(!rules.scopes[0].multitag);
        assert_eq!(rules.scopes[1].name, "App");
        assert!(rules.scopes[1].multitag);
    }

    #[test]
    fn test_parses_rows() {
        let rules = parse(SAMPLE);

        assert_eq!(rules.len(), 3);

        let web = &rules.rows[0];
        assert_eq!(web.object_type, ObjectType::Vm);
        assert_eq!(web.name, "web");
        assert_eq!(web.operator, MatchOperator::StartsWith);
        assert!(!web.resolve);
        assert_eq!(web.group_name.as_deref(), Some("Web"));
        assert_eq!(
            web.tag_values,
            vec![Some("prod".to_string()), Some("frontend".to_string())]
        );

        let ip = &rules.rows[1];
        assert_eq!(ip.object_type, ObjectType::Ip);
        assert!(ip.resolve);
        assert!(ip.group_name.is_none());
        assert_eq!(ip.tag_values, vec![Some("prod".to_string()), None]);
    }

    #[test]
    fn test_rows_before_header_are_ignored() {
        let input = "\
vm,early,,,\n\
some,note,row\n\
ObjectType,Name,Match,Resolve,GroupName,_SEP_,Env\n\
vm,web-01,,false,,_SEP_,prod\n";
        let rules = parse(input);

        assert_eq!(rules.len(), 1);
        assert_eq!(rules.rows[0].name, "web-01");
    }

    #[test]
    fn test_short_records_read_as_empty_cells() {
        let input = "\
ObjectType,Name,Match,Resolve,GroupName,_SEP_,Env,App\n\
vm,db-01\n";
        let rules = parse(input);

        assert_eq!(rules.len(), 1);
        let row = &rules.rows[0];
        assert_eq!(row.operator, MatchOperator::Exact);
        assert!(!row.resolve);
        assert!(row.group_name.is_none());
        assert_eq!(row.tag_values, vec![None, None]);
    }

    #[test]
    fn test_quoted_cells_keep_commas() {
        let input = "\
ObjectType,Name,Match,Resolve,GroupName,_SEP_,Env\n\
ip,\"10.0.0.1-10.0.0.10,192.168.1.0/24\",,false,,_SEP_,\n";
        let rules = parse(input);

        assert_eq!(rules.rows[0].name, "10.0.0.1-10.0.0.10,192.168.1.0/24");
    }

    #[test]
    fn test_missing_sentinel_column_is_fatal() {
        let input = "ObjectType,Name,Match,Resolve,_SEP_,Env\nvm,web,,,,\n";
        let err = RulesParser::new()
            .parse_reader(input.as_bytes())
            .unwrap_err();

        assert!(err.to_string().contains("GroupName"));
    }

    #[test]
    fn test_no_header_is_fatal() {
        let input = "vm,web,startswith,false,Web\n";
        let err = RulesParser::new()
            .parse_reader(input.as_bytes())
            .unwrap_err();

        assert!(err.to_string().contains("No header"));
    }

    #[test]
    fn test_load_file_missing_path() {
        let err = RulesParser::new()
            .load_file(Path::new("/nonexistent/rules.csv"))
            .unwrap_err();

        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_load_file_round_trip() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let rules = RulesParser::new().load_file(file.path()).unwrap();
        assert_eq!(rules.len(), 3);
    }

    #[test]
    fn test_blank_scope_header_cells_are_ignored() {
        let input = "\
ObjectType,Name,Match,Resolve,GroupName,_SEP_,Env,,App\n\
vm,web-01,,false,,_SEP_,prod,stray,frontend\n";
        let rules = parse(input);

        assert_eq!(rules.scopes.len(), 2);
        assert_eq!(
            rules.rows[0].tag_values,
            vec![Some("prod".to_string()), Some("frontend".to_string())]
        );
    }
}
