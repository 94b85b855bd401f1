/// Options controlling how tables are decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Follow out-of-line memo and long binary values instead of reporting
    /// them as skipped.
    pub resolve_long_values: bool,
    /// Follow overflow row pointers to the record they designate.
    pub follow_overflow_rows: bool,
    /// List system tables next to user tables.
    pub include_system_tables: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            resolve_long_values: false,
            follow_overflow_rows: true,
            include_system_tables: false,
        }
    }
}

impl ReaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolve_long_values(mut self, resolve: bool) -> Self {
        self.resolve_long_values = resolve;
        self
    }

    pub fn with_follow_overflow_rows(mut self, follow: bool) -> Self {
        self.follow_overflow_rows = follow;
        self
    }

    pub fn with_include_system_tables(mut self, include: bool) -> Self {
        self.include_system_tables = include;
        self
    }
}
