//! ISO 4217 currency names.

use std::sync::Arc;

use tote_core::arrow::array::{Array, ArrayRef, AsArray, StringArray};
use tote_core::arrow::compute::cast;
use tote_core::arrow::datatypes::{DataType, Field, Schema};
use tote_core::arrow::record_batch::RecordBatch;

use super::column_index;
use crate::error::TransformError;

/// Column added by [`add_currency_names`].
pub const CURRENCY_NAME: &str = "currency_name";

const CURRENCIES: &[(&str, &str)] = &[
    ("AED", "UAE Dirham"),
    ("ARS", "Argentine Peso"),
    ("AUD", "Australian Dollar"),
    ("BRL", "Brazilian Real"),
    ("CAD", "Canadian Dollar"),
    ("CHF", "Swiss Franc"),
    ("CLP", "Chilean Peso"),
    ("CNY", "Chinese Renminbi"),
    ("COP", "Colombian Peso"),
    ("CZK", "Czech Koruna"),
    ("DKK", "Danish Krona"),
    ("EUR", "Euro"),
    ("GBP", "British Pound"),
    ("HKD", "Hong Kong Dollar"),
    ("HUF", "Hungarian Forint"),
    ("IDR", "Indonesian Rupiah"),
    ("ILS", "Israeli Shekel"),
    ("INR", "Indian Rupee"),
    ("ISK", "Icelandic Krona"),
    ("JPY", "Japanese Yen"),
    ("KRW", "South Korean won"),
    ("MXN", "Mexican Peso"),
    ("MYR", "Malaysian Ringgit"),
    ("NOK", "Norwegian Krona"),
    ("NZD", "New Zealand Dollar"),
    ("PEN", "Peruvian Nuevo Sol"),
    ("PHP", "Philippine Peso"),
    ("PLN", "Polish Zloty"),
    ("RUB", "Russian Ruble"),
    ("SAR", "Saudi Riyal"),
    ("SEK", "Swedish Krona"),
    ("SGD", "Singapore Dollar"),
    ("THB", "Thai Baht"),
    ("TRY", "Turkish Lira"),
    ("TWD", "Taiwan Dollar"),
    ("USD", "US Dollar"),
    ("ZAR", "South African Rand"),
];

/// Human-readable name of an ISO currency code, matched case-insensitively.
pub fn currency_name(code: &str) -> Option<&'static str> {
    let code = code.trim();
    CURRENCIES
        .iter()
        .find(|(iso, _)| iso.eq_ignore_ascii_case(code))
        .map(|(_, name)| *name)
}

/// Append a `currency_name` column derived from `code_column`.
///
/// Fails the whole batch on the first unrecognised or null code.
pub fn add_currency_names(
    batch: &RecordBatch,
    code_column: &str,
) -> Result<RecordBatch, TransformError> {
    let codes = cast(batch.column(column_index(batch, code_column)?), &DataType::Utf8)?;
    let codes = codes.as_string::<i32>();

    let names = (0..codes.len())
        .map(|idx| {
            if codes.is_null(idx) {
                return Err(TransformError::Lookup {
                    code: "null".to_string(),
                });
            }
            let code = codes.value(idx);
            currency_name(code).ok_or_else(|| TransformError::Lookup {
                code: code.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let schema = batch.schema();
    let mut fields = schema.fields().iter().cloned().collect::<Vec<_>>();
    fields.push(Arc::new(Field::new(CURRENCY_NAME, DataType::Utf8, false)));
    let mut columns = batch.columns().to_vec();
    columns.push(Arc::new(StringArray::from(names)) as ArrayRef);

    let schema = Schema::new_with_metadata(fields, schema.metadata().clone());
    Ok(RecordBatch::try_new(Arc::new(schema), columns)?)
}

#[cfg(test)]
mod tests {
    use super::super::test_util::*;
    use super::*;

    #[test]
    fn test_currency_name() {
        assert_eq!(currency_name("GBP"), Some("British Pound"));
        assert_eq!(currency_name("usd"), Some("US Dollar"));
        assert_eq!(currency_name("EUR"), Some("Euro"));
        assert_eq!(currency_name("XXX"), None);
    }

    #[test]
    fn test_add_currency_names_appends_column() {
        let input = batch(vec![
            Col::Int("currency_id", vec![Some(1), Some(2)]),
            Col::Str("currency_code", vec![Some("GBP"), Some("USD")]),
        ]);
        let out = add_currency_names(&input, "currency_code").unwrap();
        assert_eq!(names(&out), vec!["currency_id", "currency_code", "currency_name"]);
        assert_eq!(
            strings(&out, "currency_name"),
            vec![Some("British Pound".into()), Some("US Dollar".into())]
        );
    }

    #[test]
    fn test_unknown_code_fails_whole_batch() {
        let input = batch(vec![Col::Str("currency_code", vec![Some("GBP"), Some("ABC")])]);
        let err = add_currency_names(&input, "currency_code").unwrap_err();
        assert!(matches!(err, TransformError::Lookup { ref code } if code == "ABC"));
    }

    #[test]
    fn test_null_code_fails() {
        let input = batch(vec![Col::Str("currency_code", vec![None])]);
        assert!(matches!(
            add_currency_names(&input, "currency_code"),
            Err(TransformError::Lookup { .. })
        ));
    }
}
