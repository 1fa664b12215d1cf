//! Fixtures shared by the benchmarks.

#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    group: TestGroup,
    query: Option<TestFile>,
    body: Option<TestFile>,
}

impl TestCase {
    pub fn new(name: &'static str, group: TestGroup, query: Option<TestFile>, body: Option<TestFile>) -> Self {
        Self { name, group, query, body }
    }

    /// Parameters in a form body only.
    pub fn form(name: &'static str, group: TestGroup, body: TestFile) -> Self {
        Self::new(name, group, None, Some(body))
    }

    /// Parameters in the query string and in a form body.
    pub fn merged(name: &'static str, group: TestGroup, query: TestFile, body: TestFile) -> Self {
        Self::new(name, group, Some(query), Some(body))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn group(&self) -> TestGroup {
        self.group
    }

    pub fn query(&self) -> Option<&'static str> {
        self.query.map(|file| file.content())
    }

    pub fn body(&self) -> &'static str {
        self.body.map_or("", |file| file.content())
    }

    /// Bytes the parser has to look at.
    pub fn input_len(&self) -> u64 {
        (self.query().map_or(0, str::len) + self.body().len()) as u64
    }
}

#[derive(Debug, Copy, Clone)]
pub struct TestFile {
    file_name: &'static str,
    content: &'static str,
}

impl TestFile {
    pub const fn new(file_name: &'static str, content: &'static str) -> Self {
        Self { file_name, content }
    }

    pub fn content(&self) -> &'static str {
        self.content
    }

    pub fn file_name(&self) -> &'static str {
        self.file_name
    }
}

#[derive(Clone, Copy, Debug)]
pub enum TestGroup {
    Small,
    Normal,
    Large,
}
