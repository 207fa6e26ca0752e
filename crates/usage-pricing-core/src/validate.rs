//! Building [`Pricing`] trees from untyped configuration data.
//!
//! Offering and listing files carry pricing as JSON-compatible maps:
//!
//! ```json
//! {"type": "multiply", "factor": "0.80", "base": {"type": "constant", "amount": "100.00"}}
//! ```
//!
//! Amounts should be written as strings so they reach [`Decimal`] without a
//! binary floating point step. Plain JSON numbers are accepted too and are
//! parsed from their literal text.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::error::{ValidationError, ValidationErrorKind, ROOT_PATH};
use crate::pricing::Pricing;
use crate::tier::Tier;

/// Validate `value` and build the pricing tree it describes.
///
/// Nested `prices`, `base` and tier `price` fields are validated recursively.
/// A tier's `price` may be a nested pricing object or a bare amount, which is
/// shorthand for a constant.
///
/// # Errors
///
/// Returns a [`ValidationError`] locating the first offending node if the
/// `type` is missing or unknown, a required field is absent or malformed, an
/// expression does not parse, or a tier list is out of order.
pub fn validate_pricing(value: &Value) -> Result<Pricing, ValidationError> {
    build(value, ROOT_PATH)
}

fn build(value: &Value, path: &str) -> Result<Pricing, ValidationError> {
    let fields = Fields::of(value, path)?;

    let pricing = match fields.type_name()? {
        "constant" => Ok(Pricing::constant(fields.decimal("amount")?)),
        "expr" => Pricing::expr(fields.string("expr")?),
        "one_million_tokens" => token_pricing(&fields),
        "one_second" => Ok(Pricing::one_second(fields.decimal("price")?)),
        "image" => Ok(Pricing::image(fields.decimal("price")?)),
        "revenue_share" => Pricing::revenue_share(fields.decimal("percentage")?),
        "add" => {
            let prices = fields
                .array("prices")?
                .iter()
                .enumerate()
                .map(|(index, price)| build(price, &format!("{path}.prices[{index}]")))
                .collect::<Result<Vec<_>, _>>()?;
            Pricing::add(prices)
        }
        "multiply" => {
            let factor = fields.decimal("factor")?;
            let base = build(fields.required("base")?, &format!("{path}.base"))?;
            Ok(Pricing::multiply(factor, base))
        }
        "tiered" => Pricing::tiered(fields.string("based_on")?, flat_tiers(&fields)?),
        "graduated" => Pricing::graduated(fields.string("based_on")?, unit_tiers(&fields)?),
        other => Err(ValidationErrorKind::UnknownType(other.to_string()).into()),
    }
    .map_err(|err| err.at(path))?;

    let pricing = match fields.optional_string("description")? {
        Some(description) => pricing.with_description(description),
        None => pricing,
    };
    let pricing = match fields.optional_string("reference")? {
        Some(reference) => pricing.with_reference(reference),
        None => pricing,
    };

    Ok(pricing)
}

fn token_pricing(fields: &Fields<'_>) -> Result<Pricing, ValidationError> {
    let price = fields.optional_decimal("price")?;
    let input = fields.optional_decimal("input")?;
    let output = fields.optional_decimal("output")?;
    let cached_input = fields.optional_decimal("cached_input")?;

    match price {
        Some(price) if input.is_none() && output.is_none() && cached_input.is_none() => {
            Ok(Pricing::one_million_tokens(price))
        }
        Some(_) => Err(ValidationErrorKind::InvalidCombination(
            "`price` cannot be combined with `input`, `output` or `cached_input`".to_string(),
        )
        .into()),
        None => Pricing::split_token_rates(input, output, cached_input),
    }
}

fn flat_tiers(fields: &Fields<'_>) -> Result<Vec<Tier<Pricing>>, ValidationError> {
    fields
        .array("tiers")?
        .iter()
        .enumerate()
        .map(|(index, value)| -> Result<Tier<Pricing>, ValidationError> {
            let path = format!("{}.tiers[{index}]", fields.path);
            let tier = Fields::of(value, &path)?;
            let up_to = tier.optional_decimal("up_to")?;
            let price_value = tier.required("price")?;
            let price = if price_value.is_object() {
                build(price_value, &format!("{path}.price"))?
            } else {
                Pricing::constant(tier.decimal("price")?)
            };
            Ok(Tier { up_to, price })
        })
        .collect()
}

fn unit_tiers(fields: &Fields<'_>) -> Result<Vec<Tier<Decimal>>, ValidationError> {
    fields
        .array("tiers")?
        .iter()
        .enumerate()
        .map(|(index, value)| -> Result<Tier<Decimal>, ValidationError> {
            let path = format!("{}.tiers[{index}]", fields.path);
            let tier = Fields::of(value, &path)?;
            Ok(Tier {
                up_to: tier.optional_decimal("up_to")?,
                price: tier.decimal("unit_price")?,
            })
        })
        .collect()
}

/// Typed access to the fields of one JSON object, with errors located at
/// `path`.
struct Fields<'a> {
    object: &'a Map<String, Value>,
    path: &'a str,
}

impl<'a> Fields<'a> {
    fn of(value: &'a Value, path: &'a str) -> Result<Self, ValidationError> {
        match value {
            Value::Object(object) => Ok(Self { object, path }),
            _ => Err(ValidationError::new(ValidationErrorKind::NotAnObject).at(path)),
        }
    }

    fn error(&self, kind: ValidationErrorKind) -> ValidationError {
        ValidationError::new(kind).at(self.path)
    }

    fn type_name(&self) -> Result<&'a str, ValidationError> {
        match self.object.get("type") {
            None | Some(Value::Null) => Err(self.error(ValidationErrorKind::MissingType)),
            Some(Value::String(name)) => Ok(name),
            Some(_) => Err(self.error(ValidationErrorKind::InvalidField {
                field: "type",
                reason: "must be a string".to_string(),
            })),
        }
    }

    /// A present, non-null field.
    fn optional(&self, field: &'static str) -> Option<&'a Value> {
        self.object.get(field).filter(|value| !value.is_null())
    }

    fn required(&self, field: &'static str) -> Result<&'a Value, ValidationError> {
        self.optional(field)
            .ok_or_else(|| self.error(ValidationErrorKind::MissingField(field)))
    }

    fn decimal(&self, field: &'static str) -> Result<Decimal, ValidationError> {
        let value = self.required(field)?;
        to_decimal(field, value).map_err(|kind| self.error(kind))
    }

    fn optional_decimal(&self, field: &'static str) -> Result<Option<Decimal>, ValidationError> {
        self.optional(field)
            .map(|value| to_decimal(field, value).map_err(|kind| self.error(kind)))
            .transpose()
    }

    fn string(&self, field: &'static str) -> Result<&'a str, ValidationError> {
        let value = self.required(field)?;
        value.as_str().ok_or_else(|| {
            self.error(ValidationErrorKind::InvalidField {
                field,
                reason: "must be a string".to_string(),
            })
        })
    }

    fn optional_string(&self, field: &'static str) -> Result<Option<&'a str>, ValidationError> {
        match self.optional(field) {
            None => Ok(None),
            Some(_) => self.string(field).map(Some),
        }
    }

    fn array(&self, field: &'static str) -> Result<&'a Vec<Value>, ValidationError> {
        let value = self.required(field)?;
        value.as_array().ok_or_else(|| {
            self.error(ValidationErrorKind::InvalidField {
                field,
                reason: "must be a list".to_string(),
            })
        })
    }
}

fn to_decimal(field: &'static str, value: &Value) -> Result<Decimal, ValidationErrorKind> {
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        _ => {
            return Err(ValidationErrorKind::InvalidField {
                field,
                reason: "must be a decimal string or number".to_string(),
            })
        }
    };
    parse_decimal(&text).ok_or(ValidationErrorKind::InvalidDecimal { field, value: text })
}

/// Parse a decimal literal exactly, accepting scientific notation.
fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str_exact(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

impl TryFrom<Value> for Pricing {
    type Error = ValidationError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        validate_pricing(&value)
    }
}

impl TryFrom<&Value> for Pricing {
    type Error = ValidationError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        validate_pricing(value)
    }
}

/// Deserializes through [`validate_pricing`], so every decoded tree is valid.
impl<'de> Deserialize<'de> for Pricing {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        validate_pricing(&value).map_err(serde::de::Error::custom)
    }
}
