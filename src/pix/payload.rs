use super::crc::{checksum, to_hex};
use crate::error::{Result, StorefrontError};
use rust_decimal::Decimal;
use std::fmt;

/// Globally unique identifier of the instant-payment arrangement.
pub const PIX_GUI: &str = "br.gov.bcb.pix";

pub const MAX_NAME_LEN: usize = 25;
pub const MAX_CITY_LEN: usize = 15;
pub const MAX_TXID_LEN: usize = 25;
pub const MAX_KEY_LEN: usize = 77;
const MAX_VALUE_LEN: usize = 99;
const MAX_AMOUNT_LEN: usize = 13;

const DEFAULT_CATEGORY_CODE: &str = "0000";
const DEFAULT_CURRENCY: &str = "986";
const COUNTRY_CODE: &str = "BR";

mod tag {
    pub const PAYLOAD_FORMAT: &str = "00";
    pub const MERCHANT_ACCOUNT: &str = "26";
    pub const ACCOUNT_GUI: &str = "00";
    pub const ACCOUNT_KEY: &str = "01";
    pub const CATEGORY_CODE: &str = "52";
    pub const CURRENCY: &str = "53";
    pub const AMOUNT: &str = "54";
    pub const COUNTRY: &str = "58";
    pub const NAME: &str = "59";
    pub const CITY: &str = "60";
    pub const ADDITIONAL_DATA: &str = "62";
    pub const REFERENCE_LABEL: &str = "05";
    pub const CRC: &str = "63";
}

/// Static fields identifying the payee.
///
/// Name and city are clamped to the field limits when the value is built, so a
/// merchant configured from the environment never produces an oversized field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merchant {
    key: String,
    name: String,
    city: String,
    category_code: String,
    currency: String,
}

impl Merchant {
    pub fn new(key: impl Into<String>, name: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: clamp(name.into(), MAX_NAME_LEN),
            city: clamp(city.into(), MAX_CITY_LEN),
            category_code: DEFAULT_CATEGORY_CODE.to_string(),
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }

    pub fn with_category_code(mut self, code: impl Into<String>) -> Self {
        self.category_code = code.into();
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn category_code(&self) -> &str {
        &self.category_code
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    fn validate(&self) -> Result<()> {
        if self.key.trim().is_empty() {
            return Err(StorefrontError::invalid_input("merchant key is empty"));
        }
        if self.key.len() > MAX_KEY_LEN {
            return Err(StorefrontError::invalid_input(format!(
                "merchant key exceeds {MAX_KEY_LEN} bytes"
            )));
        }
        check_text("payee name", &self.name, MAX_NAME_LEN)?;
        check_text("payee city", &self.city, MAX_CITY_LEN)?;
        check_digits("merchant category code", &self.category_code, 4)?;
        check_digits("currency code", &self.currency, 3)
    }
}

/// A rendered copy-and-paste payment code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Payload(String);

impl Payload {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Payload {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One tag-length-value triple. The length is implied by `value.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub tag: String,
    pub value: String,
}

impl Field {
    /// Parses the value of a template field (e.g. `26` or `62`) as nested TLV.
    pub fn children(&self) -> Result<Vec<Field>> {
        parse(&self.value)
    }
}

/// Encodes a static merchant-presented payment code.
///
/// `txid` is cut to its first 25 characters before it goes into the
/// reference-label field. The output depends on the arguments only.
pub fn encode(merchant: &Merchant, amount: Decimal, txid: &str) -> Result<Payload> {
    merchant.validate()?;
    let amount = format_amount(amount)?;
    if txid.is_empty() {
        return Err(StorefrontError::invalid_input("txid is empty"));
    }
    let txid: String = txid.chars().take(MAX_TXID_LEN).collect();

    let mut account = String::new();
    push_field(&mut account, tag::ACCOUNT_GUI, PIX_GUI)?;
    push_field(&mut account, tag::ACCOUNT_KEY, &merchant.key)?;

    let mut additional = String::new();
    push_field(&mut additional, tag::REFERENCE_LABEL, &txid)?;

    let mut out = String::with_capacity(128);
    push_field(&mut out, tag::PAYLOAD_FORMAT, "01")?;
    push_field(&mut out, tag::MERCHANT_ACCOUNT, &account)?;
    push_field(&mut out, tag::CATEGORY_CODE, &merchant.category_code)?;
    push_field(&mut out, tag::CURRENCY, &merchant.currency)?;
    push_field(&mut out, tag::AMOUNT, &amount)?;
    push_field(&mut out, tag::COUNTRY, COUNTRY_CODE)?;
    push_field(&mut out, tag::NAME, &merchant.name)?;
    push_field(&mut out, tag::CITY, &merchant.city)?;
    push_field(&mut out, tag::ADDITIONAL_DATA, &additional)?;

    // The checksum covers its own tag and length.
    out.push_str(tag::CRC);
    out.push_str("04");
    let crc = to_hex(checksum(out.as_bytes()));
    out.push_str(&crc);

    Ok(Payload(out))
}

/// Formats an amount as its count of minor units: two fractional digits, point removed.
///
/// `19.90` becomes `"1990"`, `10.5` becomes `"1050"`, `0.01` becomes `"001"`.
pub fn format_amount(amount: Decimal) -> Result<String> {
    if amount <= Decimal::ZERO {
        return Err(StorefrontError::invalid_input("amount must be positive"));
    }
    let rounded = amount.round_dp(2);
    if rounded.is_zero() {
        return Err(StorefrontError::invalid_input(
            "amount rounds to zero at two decimal places",
        ));
    }
    let digits = format!("{rounded:.2}").replace('.', "");
    if digits.len() > MAX_AMOUNT_LEN {
        return Err(StorefrontError::invalid_input(format!(
            "amount exceeds {MAX_AMOUNT_LEN} digits"
        )));
    }
    Ok(digits)
}

/// Splits a TLV string into its top-level fields.
pub fn parse(input: &str) -> Result<Vec<Field>> {
    let mut fields = Vec::new();
    let mut rest = input;
    while !rest.is_empty() {
        let header = rest
            .get(..4)
            .ok_or_else(|| StorefrontError::invalid_input("truncated field header"))?;
        let (tag, len) = header.split_at(2);
        if !is_digits(tag) || !is_digits(len) {
            return Err(StorefrontError::invalid_input(format!(
                "malformed field header {header:?}"
            )));
        }
        let len: usize = len
            .parse()
            .map_err(|_| StorefrontError::invalid_input(format!("bad length in {header:?}")))?;
        let value = rest.get(4..4 + len).ok_or_else(|| {
            StorefrontError::invalid_input(format!("field {tag} is shorter than {len} bytes"))
        })?;
        fields.push(Field {
            tag: tag.to_string(),
            value: value.to_string(),
        });
        rest = &rest[4 + len..];
    }
    Ok(fields)
}

/// Parses a payload and checks its trailing checksum field.
pub fn verify(payload: &str) -> Result<Vec<Field>> {
    let fields = parse(payload)?;
    match fields.first() {
        Some(first) if first.tag == tag::PAYLOAD_FORMAT => {}
        _ => {
            return Err(StorefrontError::invalid_input(
                "payload does not start with the format indicator",
            ));
        }
    }
    let last = fields
        .last()
        .filter(|f| f.tag == tag::CRC && f.value.len() == 4)
        .ok_or_else(|| StorefrontError::invalid_input("payload does not end with a checksum"))?;

    let body = &payload[..payload.len() - 4];
    let expected = to_hex(checksum(body.as_bytes()));
    if last.value != expected {
        return Err(StorefrontError::invalid_input(format!(
            "checksum mismatch: expected {expected}, found {}",
            last.value
        )));
    }
    Ok(fields)
}

fn push_field(out: &mut String, tag: &str, value: &str) -> Result<()> {
    if value.len() > MAX_VALUE_LEN {
        return Err(StorefrontError::invalid_input(format!(
            "field {tag} exceeds {MAX_VALUE_LEN} bytes"
        )));
    }
    out.push_str(tag);
    out.push_str(&format!("{:02}", value.len()));
    out.push_str(value);
    Ok(())
}

fn clamp(mut text: String, max_chars: usize) -> String {
    if let Some((idx, _)) = text.char_indices().nth(max_chars) {
        text.truncate(idx);
    }
    text
}

fn check_text(what: &str, value: &str, max: usize) -> Result<()> {
    if value.trim().is_empty() {
        return Err(StorefrontError::invalid_input(format!("{what} is empty")));
    }
    if value.len() > max {
        return Err(StorefrontError::invalid_input(format!(
            "{what} exceeds {max} bytes"
        )));
    }
    Ok(())
}

fn check_digits(what: &str, value: &str, len: usize) -> Result<()> {
    if value.len() == len && is_digits(value) {
        Ok(())
    } else {
        Err(StorefrontError::invalid_input(format!(
            "{what} must be {len} digits"
        )))
    }
}

fn is_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}
