use crate::{
    assembly::Instruction,
    matcher::{InstructionFilter, InstructionLocation, MethodPredicate},
    metadata::{AccessFlags, BytecodeContainer, ClassDef, Method, MethodId},
    Error, Result,
};

/// Position of one filter match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionMatch {
    /// Index of the filter in the fingerprint
    pub filter: usize,
    /// Instruction index in the method
    pub index: usize,
}

/// Position of one required string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringMatch {
    /// The required string
    pub value: String,
    /// Index of the first `const-string` carrying it
    pub index: usize,
}

/// Outcome of a successful fingerprint match.
///
/// Indices are relative to the instruction stream as it was when matched. Patches that edit the
/// method should take labels for the positions they need before editing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// Name of the fingerprint that matched
    pub fingerprint: String,
    /// The matched method
    pub method: MethodId,
    /// One entry per instruction filter, in filter order
    pub instruction_matches: Vec<InstructionMatch>,
    /// One entry per required string
    pub string_matches: Vec<StringMatch>,
}

impl MatchResult {
    /// Slot of the class declaring the matched method.
    #[must_use]
    pub fn class_slot(&self) -> usize {
        self.method.class
    }

    /// Instruction index matched by the filter at `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] for a filter index the fingerprint does not have.
    pub fn index(&self, filter: usize) -> Result<usize> {
        self.instruction_matches
            .get(filter)
            .map(|m| m.index)
            .ok_or(Error::IndexOutOfRange {
                index: filter,
                len: self.instruction_matches.len(),
            })
    }

    /// Index of the first filter match.
    #[must_use]
    pub fn first_index(&self) -> Option<usize> {
        self.instruction_matches.first().map(|m| m.index)
    }

    /// Index of the last filter match.
    #[must_use]
    pub fn last_index(&self) -> Option<usize> {
        self.instruction_matches.last().map(|m| m.index)
    }
}

/// A declarative description of a method.
///
/// Every configured part must hold for a method to match. Methods without implementation only
/// match fingerprints that have neither strings nor instruction filters.
///
/// ```rust
/// use dexweave::prelude::*;
///
/// let fingerprint = Fingerprint::new("conversionContextToString")
///     .parameters(Vec::<String>::new())
///     .returns("Ljava/lang/String;")
///     .strings(["ConversionContext{"]);
/// assert_eq!(fingerprint.name(), "conversionContextToString");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Fingerprint {
    name: String,
    access_flags: Option<AccessFlags>,
    return_type: Option<String>,
    parameters: Option<Vec<String>>,
    strings: Vec<String>,
    filters: Vec<InstructionFilter>,
    custom: Option<MethodPredicate>,
}

impl Fingerprint {
    /// Creates a fingerprint matching every method.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Name used in errors and logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requires all of `flags`.
    #[must_use]
    pub fn access(mut self, flags: AccessFlags) -> Self {
        self.access_flags = Some(flags);
        self
    }

    /// Requires the return type to start with `prefix` (`L` matches any object).
    pub fn returns(mut self, prefix: impl Into<String>) -> Self {
        self.return_type = Some(prefix.into());
        self
    }

    /// Requires exactly these parameters, each compared as a prefix.
    pub fn parameters<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters = Some(parameters.into_iter().map(Into::into).collect());
        self
    }

    /// Requires a `const-string` starting with each of `strings`.
    pub fn strings<I, S>(mut self, strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.strings.extend(strings.into_iter().map(Into::into));
        self
    }

    /// Appends an instruction filter.
    #[must_use]
    pub fn filter(mut self, filter: InstructionFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Appends several instruction filters.
    #[must_use]
    pub fn filters(mut self, filters: impl IntoIterator<Item = InstructionFilter>) -> Self {
        self.filters.extend(filters);
        self
    }

    /// Requires the custom predicate to hold. Repeated calls combine with `and`.
    #[must_use]
    pub fn custom(mut self, predicate: MethodPredicate) -> Self {
        self.custom = Some(match self.custom.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// First matching method of the container, in class then method order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PatternNotFound`] if no method matches.
    pub fn match_in(&self, container: &BytecodeContainer) -> Result<MatchResult> {
        self.match_or_none(container)
            .ok_or_else(|| self.not_found())
    }

    /// First matching method of the class at `class_slot`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassNotFound`] for a bad slot or [`Error::PatternNotFound`] if no
    /// method of the class matches.
    pub fn match_class(&self, container: &BytecodeContainer, class_slot: usize) -> Result<MatchResult> {
        let class = container.class_at(class_slot)?;
        class
            .methods
            .iter()
            .enumerate()
            .find_map(|(method, m)| {
                self.match_method(
                    MethodId {
                        class: class_slot,
                        method,
                    },
                    m,
                    class,
                )
            })
            .ok_or_else(|| self.not_found())
    }

    /// [`Fingerprint::match_in`] without the error.
    #[must_use]
    pub fn match_or_none(&self, container: &BytecodeContainer) -> Option<MatchResult> {
        container.methods().find_map(|(id, method)| {
            let class = container.classes().get(id.class)?;
            self.match_method(id, method, class)
        })
    }

    /// Matches a single method.
    #[must_use]
    pub fn match_method(&self, id: MethodId, method: &Method, class: &ClassDef) -> Option<MatchResult> {
        if !self.matches_signature(method, class) {
            return None;
        }

        let body = method.implementation.as_ref();
        if body.is_none() && !(self.strings.is_empty() && self.filters.is_empty()) {
            return None;
        }

        let mut string_matches = Vec::with_capacity(self.strings.len());
        let mut instruction_matches = Vec::new();
        if let Some(body) = body {
            let stream = body.instructions();
            for required in &self.strings {
                let index = stream.index_of_first(0, |i| {
                    i.string_reference()
                        .is_some_and(|s| s.starts_with(required.as_str()))
                })?;
                string_matches.push(StringMatch {
                    value: required.clone(),
                    index,
                });
            }

            let instructions: Vec<_> = stream.iter().collect();
            let mut positions = Vec::with_capacity(self.filters.len());
            if !self.match_filters(&instructions, 0, None, &mut positions) {
                return None;
            }
            instruction_matches = positions
                .into_iter()
                .enumerate()
                .map(|(filter, index)| InstructionMatch { filter, index })
                .collect();
        }

        log::debug!("fingerprint {} matched {}", self.name, method);
        Some(MatchResult {
            fingerprint: self.name.clone(),
            method: id,
            instruction_matches,
            string_matches,
        })
    }

    fn matches_signature(&self, method: &Method, class: &ClassDef) -> bool {
        if let Some(flags) = self.access_flags {
            if !method.access_flags.has_all(flags) {
                return false;
            }
        }
        if let Some(prefix) = &self.return_type {
            if !method.return_type.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(parameters) = &self.parameters {
            if parameters.len() != method.parameters.len()
                || !parameters
                    .iter()
                    .zip(&method.parameters)
                    .all(|(want, have)| have.starts_with(want.as_str()))
            {
                return false;
            }
        }
        self.custom
            .as_ref()
            .is_none_or(|predicate| predicate.evaluate(method, class))
    }

    /// Matches filters `filter..` against the body, trying later candidates when a subsequent
    /// filter fails.
    fn match_filters(
        &self,
        instructions: &[&Instruction],
        filter: usize,
        previous: Option<usize>,
        positions: &mut Vec<usize>,
    ) -> bool {
        let Some(current) = self.filters.get(filter) else {
            return true;
        };
        let start = previous.map_or(0, |p| p + 1);

        for index in start..instructions.len() {
            if !current.location.accepts(previous, index) {
                if matches!(
                    current.location,
                    InstructionLocation::Immediately | InstructionLocation::AfterWithin(_)
                ) {
                    break;
                }
                continue;
            }
            if !current.matches(instructions[index]) {
                continue;
            }

            positions.push(index);
            if self.match_filters(instructions, filter + 1, Some(index), positions) {
                return true;
            }
            positions.pop();

            if current.location == InstructionLocation::First {
                break;
            }
        }
        false
    }

    fn not_found(&self) -> Error {
        Error::PatternNotFound(self.name.clone())
    }
}
