//! Classes: the named state variables of a model.
//!
//! User classes are declared through a [`ClassRegistry`]. Built-in classes
//! (prefixed `model_`) are derived from the simulation calendar and are
//! registered automatically unless the registry is created without them.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::DefinitionError;

/// Prefix reserved for built-in classes.
pub const BUILTIN_PREFIX: &str = "model_";

/// Prefix carried by every compartment constant.
pub const CONSTANT_PREFIX: &str = "comp_";

const MONTHS: [(&str, &str); 12] = [
    ("jan", "January"),
    ("feb", "February"),
    ("mar", "March"),
    ("apr", "April"),
    ("may", "May"),
    ("jun", "June"),
    ("jul", "July"),
    ("aug", "August"),
    ("sept", "September"),
    ("oct", "October"),
    ("nov", "November"),
    ("dec", "December"),
];

/// Normalise a user-supplied name into an identifier usable in expressions.
#[must_use]
pub fn parse_var_name(name: &str) -> String {
    name.trim().replace(' ', "_")
}

/// Whether `name` can appear as a symbol in a propensity expression.
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Value restriction attached to a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassRestriction {
    /// Any real value.
    #[default]
    None,
    /// Integer values.
    Integer,
    /// Integer values greater or equal to zero.
    NonNegativeInteger,
    /// Either 0 or 1.
    Indicator,
}

/// Definition of a single class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    /// Unit the class is measured in.
    pub measurement_unit: String,
    /// Value restriction.
    #[serde(default)]
    pub restriction: ClassRestriction,
}

/// Calendar-derived classes maintained by the model state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BuiltinClass {
    /// Day of the month (1..=31).
    Day,
    /// Day of the year (1..=366).
    YearlyDay,
    /// Hour of the day plus the minute fraction, rounded to one decimal.
    Hour,
    /// Month number (1..=12).
    Months,
    /// One-hot indicator of a month, zero based.
    Month(u8),
}

impl BuiltinClass {
    /// Every built-in class, ordered by name.
    #[must_use]
    pub fn all() -> Vec<Self> {
        let mut all = vec![Self::Day, Self::YearlyDay, Self::Hour, Self::Months];
        all.extend((0..12).map(Self::Month));
        all.sort_by_key(|class| class.name());
        all
    }

    /// Full class name, including the reserved prefix.
    #[must_use]
    pub fn name(self) -> String {
        match self {
            Self::Day => format!("{BUILTIN_PREFIX}day"),
            Self::YearlyDay => format!("{BUILTIN_PREFIX}yearly_day"),
            Self::Hour => format!("{BUILTIN_PREFIX}hour"),
            Self::Months => format!("{BUILTIN_PREFIX}months"),
            Self::Month(m) => format!("{BUILTIN_PREFIX}month_{}", MONTHS[usize::from(m % 12)].0),
        }
    }

    /// Look up a built-in class by its full name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().into_iter().find(|class| class.name() == name)
    }

    /// Class definition registered for this built-in.
    #[must_use]
    pub fn definition(self) -> ClassDef {
        let (unit, restriction) = match self {
            Self::Day => ("day of month", ClassRestriction::NonNegativeInteger),
            Self::YearlyDay => ("day of year", ClassRestriction::NonNegativeInteger),
            Self::Hour => ("hour of day", ClassRestriction::None),
            Self::Months => ("month of year", ClassRestriction::NonNegativeInteger),
            Self::Month(m) => (MONTHS[usize::from(m % 12)].1, ClassRestriction::Indicator),
        };
        ClassDef {
            measurement_unit: unit.to_string(),
            restriction,
        }
    }

    /// Value of this class at the given calendar datetime.
    #[must_use]
    pub fn value_at(self, at: &NaiveDateTime) -> f64 {
        match self {
            Self::Day => f64::from(at.day()),
            Self::YearlyDay => f64::from(at.ordinal()),
            Self::Hour => {
                let fraction = (f64::from(at.minute()) / 60.0 * 10.0).round() / 10.0;
                f64::from(at.hour()) + fraction
            }
            Self::Months => f64::from(at.month()),
            Self::Month(m) => {
                if at.month0() == u32::from(m) {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// Registry of every class a model knows about.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassRegistry {
    classes: BTreeMap<String, ClassDef>,
    builtins: Vec<BuiltinClass>,
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassRegistry {
    /// Create a registry with all built-in classes enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            classes: BTreeMap::new(),
            builtins: BuiltinClass::all(),
        }
    }

    /// Create a registry without built-in classes.
    #[must_use]
    pub fn without_builtins() -> Self {
        Self {
            classes: BTreeMap::new(),
            builtins: Vec::new(),
        }
    }

    /// Declare a user class with no value restriction.
    pub fn add_class(&mut self, name: &str, unit: &str) -> Result<&mut Self, DefinitionError> {
        self.add_restricted_class(name, unit, ClassRestriction::None)
    }

    /// Declare a user class with the given restriction.
    pub fn add_restricted_class(
        &mut self,
        name: &str,
        unit: &str,
        restriction: ClassRestriction,
    ) -> Result<&mut Self, DefinitionError> {
        let name = parse_var_name(name);
        if !is_identifier(&name) {
            return Err(DefinitionError::InvalidName { kind: "class", name });
        }
        for prefix in [BUILTIN_PREFIX, CONSTANT_PREFIX] {
            if name.starts_with(prefix) {
                return Err(DefinitionError::ReservedClassName { name, prefix });
            }
        }
        if self.classes.contains_key(&name) {
            return Err(DefinitionError::DuplicateClass { name });
        }
        self.classes.insert(
            name,
            ClassDef {
                measurement_unit: unit.to_string(),
                restriction,
            },
        );
        Ok(self)
    }

    /// Whether `name` is a declared user class.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Definition of a user or built-in class.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ClassDef> {
        self.classes.get(name).cloned().or_else(|| {
            self.builtins
                .iter()
                .find(|b| b.name() == name)
                .map(|b| b.definition())
        })
    }

    /// User class names in sorted order.
    pub fn user_classes(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    /// Enabled built-in classes, ordered by name.
    #[must_use]
    pub fn builtins(&self) -> &[BuiltinClass] {
        &self.builtins
    }

    /// Names of the enabled built-in classes, ordered.
    #[must_use]
    pub fn builtin_names(&self) -> Vec<String> {
        self.builtins.iter().map(|b| b.name()).collect()
    }

    /// Flatten into the persisted document form (user and built-in classes).
    #[must_use]
    pub fn to_document(&self) -> BTreeMap<String, ClassDef> {
        let mut doc = self.classes.clone();
        for builtin in &self.builtins {
            doc.insert(builtin.name(), builtin.definition());
        }
        doc
    }

    /// Rebuild a registry from its persisted document form.
    pub fn from_document(doc: &BTreeMap<String, ClassDef>) -> Result<Self, DefinitionError> {
        let mut registry = Self::without_builtins();
        for (name, def) in doc {
            if name.starts_with(BUILTIN_PREFIX) {
                let builtin = BuiltinClass::from_name(name)
                    .ok_or_else(|| DefinitionError::UnknownBuiltinClass { name: name.clone() })?;
                registry.builtins.push(builtin);
            } else {
                registry.add_restricted_class(name, &def.measurement_unit, def.restriction)?;
            }
        }
        registry.builtins.sort_by_key(|b| b.name());
        Ok(registry)
    }
}
