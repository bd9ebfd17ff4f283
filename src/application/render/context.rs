/// Mutable rendering state owned by the render worker.
#[derive(Debug, Default)]
pub struct RenderContext {
    last_id: u64,
    jobs: u64,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Element identifier unique for the lifetime of the worker.
    pub fn next_id(&mut self, prefix: &str) -> String {
        self.last_id += 1;
        format!("{prefix}-{}", self.last_id)
    }

    pub fn jobs_rendered(&self) -> u64 {
        self.jobs
    }

    pub(super) fn begin_job(&mut self) {
        self.jobs += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::RenderContext;

    #[test]
    fn identifiers_never_repeat() {
        let mut ctx = RenderContext::new();
        let first = ctx.next_id("field");
        let second = ctx.next_id("field");
        let other = ctx.next_id("hint");

        assert_eq!(first, "field-1");
        assert_eq!(second, "field-2");
        assert_eq!(other, "hint-3");
    }
}
