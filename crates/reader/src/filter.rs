use crate::error::Result;
use crate::source::LineSource;
use async_trait::async_trait;

/// What to do with one upstream line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Emit,
    /// Emit this line and stop: it is the last one the cap allows.
    EmitLast,
    Skip,
}

/// Pure keyword/cap policy, independent of where lines come from.
///
/// Keyword matching is literal substring containment, order preserving.
#[derive(Debug, Clone)]
pub struct LineFilter {
    keyword: Option<String>,
    limit: Option<usize>,
    emitted: usize,
}

impl LineFilter {
    pub fn new(keyword: Option<String>, limit: Option<usize>) -> Self {
        Self {
            keyword,
            limit,
            emitted: 0,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.limit, Some(limit) if self.emitted >= limit)
    }

    pub fn check(&mut self, line: &str) -> Verdict {
        if self.is_done() {
            return Verdict::Skip;
        }
        if let Some(keyword) = &self.keyword {
            if !line.contains(keyword.as_str()) {
                return Verdict::Skip;
            }
        }
        self.emitted += 1;
        if self.is_done() {
            Verdict::EmitLast
        } else {
            Verdict::Emit
        }
    }
}

/// One-shot upstream cancellation hook, fired when the cap is reached.
pub type CancelFn = Box<dyn FnOnce() + Send>;

/// Streaming filter/cap stage over a [`LineSource`].
///
/// Emits only whole upstream lines. When the cap-th matching line is
/// produced the cancellation hook fires exactly once, at that pull, telling
/// the producer (a live file read loop or a network stream) to stop; it is
/// never invoked on natural exhaustion of the input.
pub struct FilterStage<S> {
    source: S,
    filter: LineFilter,
    cancel: Option<CancelFn>,
    finished: bool,
    capped: bool,
}

impl<S: LineSource> FilterStage<S> {
    pub fn new(source: S, filter: LineFilter) -> Self {
        Self {
            source,
            filter,
            cancel: None,
            finished: false,
            capped: false,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFn) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// True once the stage stopped because the line cap was reached, as
    /// opposed to the upstream running dry.
    pub fn capped(&self) -> bool {
        self.capped
    }

    pub async fn next_line(&mut self) -> Result<Option<String>> {
        if self.finished {
            return Ok(None);
        }
        while let Some(line) = self.source.next_line().await? {
            match self.filter.check(&line) {
                Verdict::Emit => return Ok(Some(line)),
                Verdict::EmitLast => {
                    self.finished = true;
                    self.capped = true;
                    if let Some(cancel) = self.cancel.take() {
                        cancel();
                    }
                    return Ok(Some(line));
                }
                Verdict::Skip => continue,
            }
        }
        self.finished = true;
        Ok(None)
    }
}

#[async_trait]
impl<S: LineSource> LineSource for FilterStage<S> {
    async fn next_line(&mut self) -> Result<Option<String>> {
        FilterStage::next_line(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StaticSource {
        lines: VecDeque<String>,
    }

    impl StaticSource {
        fn new(lines: &[&str]) -> Self {
            Self {
                lines: lines.iter().map(|l| l.to_string()).collect(),
            }
        }
    }

    #[async_trait]
    impl LineSource for StaticSource {
        async fn next_line(&mut self) -> Result<Option<String>> {
            Ok(self.lines.pop_front())
        }
    }

    async fn drain<S: LineSource>(stage: &mut FilterStage<S>) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(line) = stage.next_line().await.expect("pull") {
            out.push(line);
        }
        out
    }

    fn counter_cancel(counter: &Arc<AtomicUsize>) -> CancelFn {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn keyword_preserves_order() {
        let source = StaticSource::new(&["this one", "not that", "this too"]);
        let mut stage = FilterStage::new(source, LineFilter::new(Some("this".into()), None));
        assert_eq!(drain(&mut stage).await, vec!["this one", "this too"]);
    }

    #[tokio::test]
    async fn cap_fires_cancel_exactly_once_at_kth_line() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let source = StaticSource::new(&["a", "b", "c", "d"]);
        let mut stage = FilterStage::new(source, LineFilter::new(None, Some(2)))
            .with_cancel(counter_cancel(&cancels));

        assert_eq!(stage.next_line().await.expect("pull"), Some("a".into()));
        assert_eq!(cancels.load(Ordering::SeqCst), 0);
        assert_eq!(stage.next_line().await.expect("pull"), Some("b".into()));
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
        assert_eq!(stage.next_line().await.expect("pull"), None);
        assert_eq!(stage.next_line().await.expect("pull"), None);
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn keyword_and_cap_compose() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let source = StaticSource::new(&["x err 1", "ok", "x err 2", "x err 3"]);
        let mut stage = FilterStage::new(source, LineFilter::new(Some("err".into()), Some(2)))
            .with_cancel(counter_cancel(&cancels));
        assert_eq!(drain(&mut stage).await, vec!["x err 1", "x err 2"]);
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_input_yields_nothing_and_no_cancel() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let source = StaticSource::new(&[]);
        let mut stage = FilterStage::new(source, LineFilter::new(Some("x".into()), Some(1)))
            .with_cancel(counter_cancel(&cancels));
        assert_eq!(drain(&mut stage).await, Vec::<String>::new());
        assert_eq!(cancels.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhaustion_below_cap_does_not_cancel() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let source = StaticSource::new(&["only"]);
        let mut stage = FilterStage::new(source, LineFilter::new(None, Some(5)))
            .with_cancel(counter_cancel(&cancels));
        assert_eq!(drain(&mut stage).await, vec!["only"]);
        assert_eq!(cancels.load(Ordering::SeqCst), 0);
    }
}
