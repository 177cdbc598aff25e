//! Process calls: an operation name plus an untyped argument list, converted
//! into one typed request per operation before the engine runs.

use crate::error::AppError;
use crate::filter::FilterGroup;
use crate::service::{
    CrudService, DeleteRequest, FindRequest, RecordId, SaveRequest, SearchRequest, SettingsRequest,
};
use crate::sql::SortKey;
use crate::state::EngineState;
use serde_json::Value;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Search,
    Find,
    Save,
    Delete,
    Settings,
}

/// Matches the last `.`-separated segment, ignoring case: `table.Search` is `search`.
impl FromStr for Operation {
    type Err = AppError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let op = name.rsplit('.').next().unwrap_or(name).to_ascii_lowercase();
        match op.as_str() {
            "search" => Ok(Operation::Search),
            "find" => Ok(Operation::Find),
            "save" => Ok(Operation::Save),
            "delete" => Ok(Operation::Delete),
            "setting" | "settings" => Ok(Operation::Settings),
            _ => Err(AppError::bad_request(format!("unknown process '{}'", name))),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ProcessRequest {
    Search(SearchRequest),
    Find(FindRequest),
    Save(SaveRequest),
    Delete(DeleteRequest),
    Settings(SettingsRequest),
}

impl ProcessRequest {
    pub fn parse(name: &str, args: Vec<Value>) -> Result<Self, AppError> {
        let op: Operation = name.parse()?;
        let max_args = match op {
            Operation::Search => 5,
            Operation::Find | Operation::Save | Operation::Delete => 2,
            Operation::Settings => 1,
        };
        if args.len() > max_args {
            return Err(AppError::bad_request(format!(
                "{} takes at most {} arguments, got {}",
                name,
                max_args,
                args.len()
            )));
        }
        let mut args = args.into_iter();
        let table = table_arg(args.next())?;
        Ok(match op {
            Operation::Search => ProcessRequest::Search(SearchRequest {
                table,
                filter: filter_arg(args.next())?,
                page: int_arg("page", args.next())?,
                page_size: int_arg("pageSize", args.next())?,
                sort: sort_arg(args.next())?,
            }),
            Operation::Find => ProcessRequest::Find(FindRequest {
                table,
                id: args.next().as_ref().and_then(RecordId::from_json),
            }),
            Operation::Save => ProcessRequest::Save(SaveRequest {
                table,
                record: match args.next() {
                    Some(Value::Object(map)) => map,
                    _ => return Err(AppError::bad_request("save requires a record object")),
                },
            }),
            Operation::Delete => ProcessRequest::Delete(DeleteRequest {
                table,
                id: args.next().as_ref().and_then(RecordId::from_json),
            }),
            Operation::Settings => ProcessRequest::Settings(SettingsRequest { table }),
        })
    }
}

fn table_arg(v: Option<Value>) -> Result<String, AppError> {
    match v {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(AppError::bad_request("first argument must be a table name")),
    }
}

fn filter_arg(v: Option<Value>) -> Result<FilterGroup, AppError> {
    match v {
        None | Some(Value::Null) => Ok(FilterGroup::default()),
        Some(v @ Value::Object(_)) => {
            serde_json::from_value(v).map_err(|e| AppError::bad_request(format!("invalid filter: {}", e)))
        }
        Some(_) => Err(AppError::bad_request("filter must be an object")),
    }
}

fn int_arg(name: &str, v: Option<Value>) -> Result<Option<i64>, AppError> {
    match v {
        None | Some(Value::Null) => Ok(None),
        // integral floats such as 2.0 are accepted; fractions are not truncated
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            })
            .map(Some)
            .ok_or_else(|| AppError::bad_request(format!("{} must be an integer, got {}", name, n))),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AppError::bad_request(format!("{} must be an integer, got '{}'", name, s))),
        Some(_) => Err(AppError::bad_request(format!("{} must be an integer", name))),
    }
}

fn sort_arg(v: Option<Value>) -> Result<Option<SortKey>, AppError> {
    match v {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => s.parse().map(Some),
        Some(v @ Value::Object(_)) => serde_json::from_value(v)
            .map(Some)
            .map_err(|e| AppError::bad_request(format!("invalid sort: {}", e))),
        Some(_) => Err(AppError::bad_request("sort must be a string or object")),
    }
}

/// Run one process call and return its JSON result. `delete` yields `null`.
pub async fn dispatch(state: &EngineState, name: &str, args: Vec<Value>) -> Result<Value, AppError> {
    let request = ProcessRequest::parse(name, args)?;
    tracing::debug!(process = name, request = ?request, "dispatch");
    let result = match request {
        ProcessRequest::Search(req) => serde_json::to_value(CrudService::search(state, &req).await?)?,
        ProcessRequest::Find(req) => Value::Object(CrudService::find(state, &req).await?),
        ProcessRequest::Save(req) => serde_json::to_value(CrudService::save(state, &req).await?)?,
        ProcessRequest::Delete(req) => {
            CrudService::delete(state, &req).await?;
            Value::Null
        }
        ProcessRequest::Settings(req) => serde_json::to_value(&*CrudService::settings(state, &req.table).await?)?,
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterCondition, FilterNode};
    use crate::sql::SortDirection;
    use serde_json::json;

    #[test]
    fn test_operation_names() {
        assert_eq!("search".parse::<Operation>().unwrap(), Operation::Search);
        assert_eq!("table.Search".parse::<Operation>().unwrap(), Operation::Search);
        assert_eq!("app.table.Setting".parse::<Operation>().unwrap(), Operation::Settings);
        assert_eq!("SETTINGS".parse::<Operation>().unwrap(), Operation::Settings);
        assert!(matches!("table.Purge".parse::<Operation>(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_parse_search() {
        let req = ProcessRequest::parse(
            "table.Search",
            vec![
                json!("service"),
                json!({ "wheres": [{ "column": "status", "value": "enabled" }] }),
                json!(1),
                json!("2"),
            ],
        )
        .unwrap();
        let ProcessRequest::Search(s) = req else { panic!("expected search") };
        assert_eq!(s.table, "service");
        assert_eq!(s.page, Some(1));
        assert_eq!(s.page_size, Some(2));
        assert_eq!(s.sort, None);
        assert_eq!(
            s.filter.conditions,
            vec![FilterNode::Condition(FilterCondition::eq("status", json!("enabled")))]
        );
    }

    #[test]
    fn test_parse_search_defaults_and_sort() {
        let req = ProcessRequest::parse("search", vec![json!("service"), json!(null), json!(null), json!(null), json!("created_at desc")]).unwrap();
        let ProcessRequest::Search(s) = req else { panic!("expected search") };
        assert!(s.filter.is_empty());
        assert_eq!((s.page, s.page_size), (None, None));
        assert_eq!(s.sort.map(|k| k.direction), Some(SortDirection::Desc));
    }

    #[test]
    fn test_parse_search_rejects_bad_shapes() {
        assert!(ProcessRequest::parse("search", vec![json!("service"), json!([1])]).is_err());
        assert!(ProcessRequest::parse("search", vec![json!("service"), json!(null), json!("one")]).is_err());
        assert!(ProcessRequest::parse("search", vec![json!("service"), json!({ "bogus": 1 })]).is_err());
        assert!(ProcessRequest::parse("search", vec![json!(1)]).is_err());
        assert!(ProcessRequest::parse("search", vec![]).is_err());
    }

    #[test]
    fn test_parse_search_page_numbers() {
        let parse = |page: Value| ProcessRequest::parse("search", vec![json!("service"), json!(null), page]);
        let ProcessRequest::Search(s) = parse(json!(2.0)).unwrap() else { panic!("expected search") };
        assert_eq!(s.page, Some(2));
        assert!(matches!(parse(json!(1.9)), Err(AppError::BadRequest(_))));
        assert!(matches!(parse(json!(1e300)), Err(AppError::BadRequest(_))));
        let ProcessRequest::Search(s) = parse(json!(-4)).unwrap() else { panic!("expected search") };
        assert_eq!(s.page, Some(-4));
    }

    #[test]
    fn test_parse_find_and_delete_ids() {
        let ProcessRequest::Find(f) = ProcessRequest::parse("find", vec![json!("service"), json!(1)]).unwrap() else {
            panic!("expected find")
        };
        assert_eq!(f.id, Some(RecordId::Int(1)));

        let ProcessRequest::Find(f) = ProcessRequest::parse("find", vec![json!("service")]).unwrap() else {
            panic!("expected find")
        };
        assert_eq!(f.id, None);

        let ProcessRequest::Delete(d) = ProcessRequest::parse("delete", vec![json!("service"), json!({ "id": 1 })]).unwrap() else {
            panic!("expected delete")
        };
        assert_eq!(d.id, None);
    }

    #[test]
    fn test_parse_save_requires_object() {
        let req = ProcessRequest::parse("save", vec![json!("service"), json!({ "name": "X", "kind_id": 3 })]).unwrap();
        let ProcessRequest::Save(s) = req else { panic!("expected save") };
        assert_eq!(s.record.get("kind_id"), Some(&json!(3)));
        assert!(ProcessRequest::parse("save", vec![json!("service"), json!("X")]).is_err());
        assert!(ProcessRequest::parse("save", vec![json!("service")]).is_err());
    }

    #[test]
    fn test_parse_rejects_extra_arguments() {
        let err = ProcessRequest::parse("settings", vec![json!("service"), json!({})]).unwrap_err();
        assert!(err.to_string().contains("at most 1"));
    }
}
