//! Listings, bid amounts and the per-listing bid map
//!
//! Everything in here is plain data plus field validation. Storage and
//! the rules about *who* may change *what* live in [`crate::service`].
use crate::error::ListingError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub type ListingId = String;
pub type ListingIdRef<'s> = &'s str;
pub type UserId = String;
pub type UserIdRef<'s> = &'s str;

pub const TITLE_MAX_CHARS: usize = 140;
pub const DESCRIPTION_MAX_CHARS: usize = 5000;

/// A non-negative decimal amount of money
///
/// Always compared numerically: `"150" < "9999"` and `"1.50" == "1.5"`.
/// Serialized as a string so no precision is lost on the way out.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "String")]
pub struct Amount(Decimal);

/// Why some text is not an [`Amount`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AmountError {
    NotANumber,
    Negative,
    /// A number, but too large or too precise for a decimal amount
    OutOfRange,
}

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    /// Parse a non-negative amount, accepting plain and scientific notation
    ///
    /// Only `[+-]digits[.digits][e[+-]digits]` is a number here; digit
    /// separators, hex, `NaN` and the like are not.
    pub fn parse(s: &str) -> Result<Amount, AmountError> {
        let literal = DecimalLiteral::scan(s.trim()).ok_or(AmountError::NotANumber)?;
        let value = match literal.exponent {
            None => Decimal::from_str(&literal.mantissa),
            Some(exponent) => Decimal::from_scientific(&format!("{}e{exponent}", literal.mantissa)),
        }
        .map_err(|_| AmountError::OutOfRange)?;
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::Negative);
        }
        Ok(Amount(value))
    }

    /// Parse an amount offered as a bid: must be a number greater than zero
    pub fn parse_bid(s: &str) -> Result<Amount, ListingError> {
        match Amount::parse(s) {
            Ok(amount) if amount > Amount::ZERO => Ok(amount),
            Err(AmountError::OutOfRange) => Err(ListingError::InvalidAmount(AMOUNT_OUT_OF_RANGE)),
            _ => Err(ListingError::InvalidAmount(AMOUNT_NOT_POSITIVE)),
        }
    }
}

pub const AMOUNT_NOT_POSITIVE: &str = "offered amount must be a positive number";
pub const AMOUNT_OUT_OF_RANGE: &str = "offered amount is too large or too precise";

/// A decimal number split into a normalized mantissa (`-12.5`, `0.5`, `5`)
/// and an optional exponent
struct DecimalLiteral<'s> {
    mantissa: String,
    exponent: Option<&'s str>,
}

impl<'s> DecimalLiteral<'s> {
    fn scan(s: &'s str) -> Option<Self> {
        let (negative, unsigned) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let (mantissa, exponent) = match unsigned.split_once(|c: char| c == 'e' || c == 'E') {
            Some((mantissa, exponent)) => (mantissa, Some(exponent)),
            None => (unsigned, None),
        };
        let (int, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        if (int.is_empty() && frac.is_empty()) || !all_digits(int) || !all_digits(frac) {
            return None;
        }
        if let Some(exponent) = exponent {
            let digits = exponent
                .strip_prefix(|c: char| c == '+' || c == '-')
                .unwrap_or(exponent);
            if digits.is_empty() || !all_digits(digits) {
                return None;
            }
        }

        let mut normalized = String::with_capacity(mantissa.len() + 2);
        if negative {
            normalized.push('-');
        }
        normalized.push_str(if int.is_empty() { "0" } else { int });
        if !frac.is_empty() {
            normalized.push('.');
            normalized.push_str(frac);
        }
        Some(Self {
            mantissa: normalized,
            exponent,
        })
    }
}

fn all_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.to_string()
    }
}

/// An amount as sent by a client: either a JSON string or a JSON number
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawAmount {
    Text(String),
    Number(serde_json::Number),
}

impl RawAmount {
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            RawAmount::Text(s) => Cow::Borrowed(s),
            RawAmount::Number(n) => Cow::Owned(n.to_string()),
        }
    }

    /// `""` and `0` count as "nothing supplied" in a patch
    pub fn is_falsy(&self) -> bool {
        match self {
            RawAmount::Text(s) => s.is_empty(),
            RawAmount::Number(n) => n.as_f64() == Some(0.0),
        }
    }
}

impl From<&str> for RawAmount {
    fn from(s: &str) -> Self {
        RawAmount::Text(s.to_owned())
    }
}

/// Bids on a single listing, keyed by bidder
///
/// A bidder has at most one entry; placing again replaces it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Bids(BTreeMap<UserId, Amount>);

impl Bids {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, bidder: UserIdRef) -> Option<Amount> {
        self.0.get(bidder).copied()
    }

    /// Maximum across all current entries
    pub fn highest(&self) -> Option<Amount> {
        self.0.values().max().copied()
    }

    /// Insert or overwrite `bidder`'s entry, returning the previous one
    pub fn place(&mut self, bidder: UserIdRef, amount: Amount) -> Option<Amount> {
        self.0.insert(bidder.to_owned(), amount)
    }

    pub fn withdraw(&mut self, bidder: UserIdRef) -> Option<Amount> {
        self.0.remove(bidder)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (UserIdRef<'_>, Amount)> {
        self.0.iter().map(|(bidder, amount)| (bidder.as_str(), *amount))
    }
}

impl<'a> FromIterator<(&'a str, Amount)> for Bids {
    fn from_iter<I: IntoIterator<Item = (&'a str, Amount)>>(iter: I) -> Self {
        Bids(
            iter.into_iter()
                .map(|(bidder, amount)| (bidder.to_owned(), amount))
                .collect(),
        )
    }
}

impl FromIterator<(UserId, Amount)> for Bids {
    fn from_iter<I: IntoIterator<Item = (UserId, Amount)>>(iter: I) -> Self {
        Bids(iter.into_iter().collect())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: ListingId,
    #[serde(rename = "userId")]
    pub owner_id: UserId,
    pub title: String,
    pub description: String,
    pub starting_price: Amount,
    pub deadline: Option<DateTime<Utc>>,
    pub completed: bool,
    pub bids: Bids,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    pub fn is_owned_by(&self, user: UserIdRef) -> bool {
        self.owner_id == user
    }

    pub fn is_overdue(&self) -> bool {
        self.is_overdue_at(Utc::now())
    }

    /// Past its deadline and not marked completed. Informational only.
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        match self.deadline {
            Some(deadline) => !self.completed && now > deadline,
            None => false,
        }
    }
}

/// Fields supplied when creating a listing
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewListing {
    pub title: Option<String>,
    pub description: Option<String>,
    pub starting_price: Option<RawAmount>,
    pub deadline: Option<String>,
}

impl NewListing {
    pub fn into_listing(
        self,
        id: ListingId,
        owner_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Listing, ListingError> {
        let title = validate_title(self.title.as_deref().unwrap_or_default())?;
        let description = validate_description(self.description.as_deref().unwrap_or_default())?;
        let starting_price = match &self.starting_price {
            Some(raw) => validate_starting_price(raw)?,
            None => return Err(ListingError::validation("starting price is required")),
        };
        let deadline = match self.deadline.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) => Some(parse_deadline(s)?),
        };

        Ok(Listing {
            id,
            owner_id,
            title,
            description,
            starting_price,
            deadline,
            completed: false,
            bids: Bids::new(),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Owner edits to a listing
///
/// Compatibility quirk: an empty string (or `0` for the price) in `title`,
/// `description`, `startingPrice` or `deadline` means "leave unchanged",
/// while `completed` overwrites whenever present, `false` included.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListingPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub starting_price: Option<RawAmount>,
    pub deadline: Option<String>,
    pub completed: Option<bool>,
}

impl ListingPatch {
    /// Validate every supplied field, then apply them all or none
    pub fn apply(self, listing: &mut Listing, now: DateTime<Utc>) -> Result<(), ListingError> {
        let title = truthy(self.title).map(|t| validate_title(&t)).transpose()?;
        let description = truthy(self.description)
            .map(|d| validate_description(&d))
            .transpose()?;
        let starting_price = self
            .starting_price
            .filter(|raw| !raw.is_falsy())
            .map(|raw| validate_starting_price(&raw))
            .transpose()?;
        let deadline = truthy(self.deadline)
            .map(|d| parse_deadline(&d))
            .transpose()?;

        if let Some(title) = title {
            listing.title = title;
        }
        if let Some(description) = description {
            listing.description = description;
        }
        if let Some(starting_price) = starting_price {
            listing.starting_price = starting_price;
        }
        if let Some(deadline) = deadline {
            listing.deadline = Some(deadline);
        }
        if let Some(completed) = self.completed {
            listing.completed = completed;
        }
        listing.updated_at = now;
        Ok(())
    }
}

fn truthy(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.is_empty())
}

pub fn validate_title(title: &str) -> Result<String, ListingError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ListingError::validation("title is required"));
    }
    if title.chars().count() > TITLE_MAX_CHARS {
        return Err(ListingError::validation(format!(
            "title must be at most {TITLE_MAX_CHARS} characters"
        )));
    }
    Ok(title.to_owned())
}

pub fn validate_description(description: &str) -> Result<String, ListingError> {
    let description = description.trim();
    if description.chars().count() > DESCRIPTION_MAX_CHARS {
        return Err(ListingError::validation("description is too long"));
    }
    Ok(description.to_owned())
}

pub fn validate_starting_price(raw: &RawAmount) -> Result<Amount, ListingError> {
    let text = raw.as_text();
    if text.trim().is_empty() {
        return Err(ListingError::validation("starting price is required"));
    }
    Amount::parse(&text).map_err(|e| match e {
        AmountError::OutOfRange => {
            ListingError::validation("starting price is too large or too precise")
        }
        AmountError::NotANumber | AmountError::Negative => {
            ListingError::validation("starting price must be a non-negative number")
        }
    })
}

/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM[:SS]` and `YYYY-MM-DD`; the last
/// two are read as UTC
pub fn parse_deadline(s: &str) -> Result<DateTime<Utc>, ListingError> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ListingError::validation("deadline must be a valid date"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn amount(s: &str) -> Amount {
        Amount::parse(s).expect("valid amount")
    }

    #[test]
    fn amounts_compare_numerically() {
        assert!(amount("150") < amount("9999"));
        assert!(amount("9") < amount("10"));
        assert_eq!(amount("1.50"), amount("1.5"));
        assert_eq!(amount("1e3"), amount("1000"));
    }

    #[test]
    fn bid_amounts_must_be_positive_numbers() {
        for bad in ["", "  ", "abc", "0", "0.00", "-5", "12abc", "NaN"] {
            assert!(
                matches!(Amount::parse_bid(bad), Err(ListingError::InvalidAmount(_))),
                "{bad:?} accepted"
            );
        }
        assert_eq!(Amount::parse_bid(" 0.01 ").ok(), Some(amount("0.01")));
    }

    #[test]
    fn only_plain_decimal_text_is_a_number() {
        for not_a_number in [
            "1_000", "1__0", "5_", "_5", "1.2.3", "1,5", "0x10", ".", "-", "e5", "1e", "1e+",
            "1e5.5", "Infinity", "+-1", "1 000",
        ] {
            assert_eq!(
                Amount::parse(not_a_number),
                Err(AmountError::NotANumber),
                "{not_a_number:?}"
            );
        }

        assert_eq!(Amount::parse("+5"), Ok(amount("5")));
        assert_eq!(Amount::parse(".5"), Ok(amount("0.5")));
        assert_eq!(Amount::parse("5."), Ok(amount("5")));
        assert_eq!(Amount::parse("1E2"), Ok(amount("100")));
        assert_eq!(Amount::parse("2.5e-1"), Ok(amount("0.25")));
        assert_eq!(Amount::parse("-3"), Err(AmountError::Negative));
        assert_eq!(Amount::parse("-0"), Ok(Amount::ZERO));
    }

    #[test]
    fn numbers_beyond_decimal_range_are_told_apart() {
        for huge in ["99999999999999999999999999999", "1e30", "1e-40"] {
            assert_eq!(Amount::parse(huge), Err(AmountError::OutOfRange), "{huge:?}");
            match Amount::parse_bid(huge) {
                Err(e @ ListingError::InvalidAmount(_)) => {
                    assert_eq!(e.to_string(), AMOUNT_OUT_OF_RANGE)
                }
                other => panic!("{huge:?}: {other:?}"),
            }
        }
        assert_eq!(
            Amount::parse_bid("abc").map_err(|e| e.to_string()),
            Err(AMOUNT_NOT_POSITIVE.to_owned())
        );
    }

    #[test]
    fn highest_bid_is_the_maximum_value() {
        let mut bids: Bids = [("a", amount("120")), ("b", amount("150"))]
            .into_iter()
            .collect();
        assert_eq!(bids.highest(), Some(amount("150")));

        assert_eq!(bids.place("a", amount("900")), Some(amount("120")));
        assert_eq!(bids.len(), 2);
        assert_eq!(bids.highest(), Some(amount("900")));

        bids.withdraw("a");
        assert_eq!(bids.highest(), Some(amount("150")));
        assert_eq!(Bids::new().highest(), None);
    }

    #[test]
    fn deadline_formats() {
        let midnight = Utc.with_ymd_and_hms(2025, 12, 31, 0, 0, 0).unwrap();
        assert_eq!(parse_deadline("2025-12-31").ok(), Some(midnight));
        assert_eq!(parse_deadline("2025-12-31T00:00:00.000Z").ok(), Some(midnight));
        assert_eq!(parse_deadline("2025-12-31T00:00").ok(), Some(midnight));
        assert!(parse_deadline("2025-13-45").is_err());
        assert!(parse_deadline("tomorrow").is_err());
    }

    #[test]
    fn overdue_needs_a_passed_deadline_and_an_open_listing() -> anyhow::Result<()> {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let mut listing = NewListing {
            title: Some("Lamp".into()),
            starting_price: Some("10".into()),
            deadline: Some("2025-06-01".into()),
            ..Default::default()
        }
        .into_listing("l1".into(), "owner".into(), now)?;

        assert!(listing.is_overdue_at(now));
        listing.completed = true;
        assert!(!listing.is_overdue_at(now));
        listing.completed = false;
        listing.deadline = None;
        assert!(!listing.is_overdue_at(now));
        Ok(())
    }

    #[test]
    fn serializes_with_plain_id_and_string_amounts() -> anyhow::Result<()> {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let mut listing = NewListing {
            title: Some("Lamp".into()),
            starting_price: Some(RawAmount::Number(serde_json::Number::from(25u32))),
            ..Default::default()
        }
        .into_listing("l1".into(), "owner".into(), now)?;
        listing.bids.place("bob", amount("30.5"));

        let json = serde_json::to_value(&listing)?;
        assert_eq!(json["id"], "l1");
        assert_eq!(json["userId"], "owner");
        assert_eq!(json["startingPrice"], "25");
        assert_eq!(json["bids"]["bob"], "30.5");
        assert_eq!(json["deadline"], serde_json::Value::Null);
        Ok(())
    }
}
