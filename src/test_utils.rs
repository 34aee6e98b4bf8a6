use std::{io::BufRead, path::{Path, PathBuf}};

use anyhow::bail;
use itertools::Itertools;
use serde::{de::{Error, Visitor}, Deserialize};

use crate::error::TabpError;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TestOutput {
    Number(f64),
    Printed(String),
    Anything, // null, the value is not checked
}

/// Expected outcome of one input line: the value, or the name of the
/// root cause of the error.
pub type TestEvaluationResult = Result<TestOutput, String>;

struct EvaluationRecord(TestEvaluationResult);

struct EvaluationRecordVisitor;

impl<'de> Deserialize<'de> for EvaluationRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: serde::Deserializer<'de> {

        deserializer.deserialize_map(EvaluationRecordVisitor)
    }
}

impl<'de> Visitor<'de> for EvaluationRecordVisitor {
    type Value = EvaluationRecord;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(formatter, "A structure containing the boolean key 'ok'. If it's okay, contains the key 'output', otherwise the key 'type'")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: serde::de::MapAccess<'de>, {

        if map.next_key::<String>()?.as_deref() != Some("ok") {
            return Err(A::Error::custom("First key should be 'ok'"))
        }

        let ok: bool = map.next_value()?;
        let expected_key = if ok { "output" } else { "type" };
        if map.next_key::<String>()?.as_deref() != Some(expected_key) {
            return Err(A::Error::custom(format!("Second key should be '{}'", expected_key)))
        }

        let result = if ok {
            Ok(map.next_value::<TestOutput>()?)
        } else {
            Err(map.next_value::<String>()?)
        };

        if map.next_key::<String>()?.is_some() {
            return Err(A::Error::custom("Only two keys should be present"));
        }

        Ok(EvaluationRecord(result))
    }
}

/// Name the test outputs use for the root cause of `error`.
pub fn error_type(error: &TabpError) -> &'static str {
    match error.root_cause() {
        TabpError::FunctionNotFound(_) => "FunctionNotFound",
        TabpError::NameNotSymbol(_) => "NameNotSymbol",
        TabpError::NotANumber { .. } => "NotANumber",
        TabpError::MissingArgument => "MissingArgument",
        TabpError::FormatNotString => "FormatNotString",
        TabpError::VariableNameNotSymbol => "VariableNameNotSymbol",
        TabpError::Defun(_) => "Defun",
        TabpError::NotFinite { .. } => "NotFinite",
        TabpError::Parse(_) => "Parse",
        TabpError::Raised(_) => "Raised",
        TabpError::Eval { .. } => "Eval",
    }
}

fn base_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

fn load_input_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<String>> {
    let source = std::fs::read(path)?;
    Ok(source.lines().collect::<Result<Vec<String>, _>>()?)
}

fn load_output_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<TestEvaluationResult>> {
    let source = std::fs::read(path)?;
    let records: Vec<EvaluationRecord> = serde_json::from_slice(&source)?;
    Ok(records.into_iter().map(|record| record.0).collect())
}

pub fn load_test_pair(testcase: &str) -> anyhow::Result<Vec<(String, TestEvaluationResult)>> {
    let input = load_input_file(base_path().join("test_inputs").join(format!("{}.tabp", testcase)))?;
    let output = load_output_file(base_path().join("test_outputs").join(format!("{}.json", testcase)))?;

    if input.len() != output.len() { bail!("Input and output of testcase {} do not match", testcase); }
    Ok(input.into_iter().zip(output).collect_vec())
}

/// Names of every testcase under `test_inputs/`, in order.
pub fn all_testcases() -> anyhow::Result<Vec<String>> {
    let mut testcases = Vec::new();
    for entry in std::fs::read_dir(base_path().join("test_inputs"))? {
        let path = entry?.path();
        if path.extension().is_some_and(|extension| extension == "tabp") {
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                testcases.push(stem.to_owned());
            }
        }
    }

    if testcases.is_empty() { bail!("No testcases found"); }
    Ok(testcases.into_iter().sorted_by_key(|name| name.parse::<usize>().unwrap_or(usize::MAX)).collect())
}
