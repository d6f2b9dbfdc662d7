//! 동적 계측기 레지스트리
//!
//! 파이프라인/스테이지/규칙별 계측기는 ID가 이름에 들어가므로, 리로드로 사라진 ID의
//! 계측기를 제거할 수 있어야 합니다. [`MetricRegistry`]는 등록과 접두어 단위 제거를
//! 명시적인 호출로 표현합니다.
//!
//! - [`RecorderMetricRegistry`]: `metrics` 전역 레코더로 전달 (제거는 레코더에 위임할 수 없어 이름만 추적)
//! - [`InMemoryMetricRegistry`]: 원자 셀 보관, 조회와 제거 지원 (테스트, CLI)

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use metrics::{Counter, Histogram, HistogramFn};

/// 이름으로 계측기를 등록하고 접두어로 제거하는 레지스트리
pub trait MetricRegistry: Send + Sync + 'static {
    /// 카운터를 등록하거나 기존 카운터를 반환합니다.
    fn counter(&self, name: &str) -> Counter;

    /// 히스토그램(타이머)을 등록하거나 기존 히스토그램을 반환합니다.
    fn histogram(&self, name: &str) -> Histogram;

    /// 이름이 `prefix`로 시작하는 계측기를 모두 제거하고 제거한 수를 반환합니다.
    fn remove_matching(&self, prefix: &str) -> usize;
}

/// `metrics` 전역 레코더로 전달하는 레지스트리
#[derive(Debug, Default)]
pub struct RecorderMetricRegistry {
    names: Mutex<BTreeSet<String>>,
}

impl RecorderMetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn track(&self, name: &str) {
        if let Ok(mut names) = self.names.lock() {
            names.insert(name.to_owned());
        }
    }
}

impl MetricRegistry for RecorderMetricRegistry {
    fn counter(&self, name: &str) -> Counter {
        self.track(name);
        metrics::counter!(name.to_owned())
    }

    fn histogram(&self, name: &str) -> Histogram {
        self.track(name);
        metrics::histogram!(name.to_owned())
    }

    fn remove_matching(&self, prefix: &str) -> usize {
        let Ok(mut names) = self.names.lock() else {
            return 0;
        };
        let before = names.len();
        names.retain(|name| !name.starts_with(prefix));
        let removed = before - names.len();
        if removed > 0 {
            // 전역 레코더에는 제거 API가 없으므로 익스포터의 idle timeout에 맡깁니다.
            tracing::debug!(prefix, removed, "untracked dynamic instruments");
        }
        removed
    }
}

/// 히스토그램 샘플 요약 (개수, 합계)
#[derive(Debug, Default)]
pub struct HistogramCell {
    count: AtomicU64,
    sum_micros: AtomicU64,
}

impl HistogramCell {
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// 기록된 값의 합 (마이크로 단위 정밀도)
    pub fn sum(&self) -> f64 {
        self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }
}

impl HistogramFn for HistogramCell {
    fn record(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        let micros = (value.max(0.0) * 1_000_000.0) as u64;
        self.sum_micros.fetch_add(micros, Ordering::Relaxed);
    }
}

#[derive(Default)]
struct Cells {
    counters: BTreeMap<String, Arc<AtomicU64>>,
    histograms: BTreeMap<String, Arc<HistogramCell>>,
}

/// 메모리에 값을 보관하는 레지스트리
#[derive(Default)]
pub struct InMemoryMetricRegistry {
    cells: Mutex<Cells>,
}

impl InMemoryMetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 카운터 값. 등록되지 않았으면 `None`.
    pub fn counter_value(&self, name: &str) -> Option<u64> {
        let cells = self.cells.lock().ok()?;
        cells.counters.get(name).map(|c| c.load(Ordering::Relaxed))
    }

    /// 히스토그램 샘플 수. 등록되지 않았으면 `None`.
    pub fn histogram_count(&self, name: &str) -> Option<u64> {
        let cells = self.cells.lock().ok()?;
        cells.histograms.get(name).map(|h| h.count())
    }

    /// 등록된 모든 계측기 이름 (정렬)
    pub fn names(&self) -> Vec<String> {
        let Ok(cells) = self.cells.lock() else {
            return Vec::new();
        };
        let mut names: Vec<String> = cells
            .counters
            .keys()
            .chain(cells.histograms.keys())
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// 0이 아닌 카운터 스냅샷
    pub fn counters(&self) -> BTreeMap<String, u64> {
        let Ok(cells) = self.cells.lock() else {
            return BTreeMap::new();
        };
        cells
            .counters
            .iter()
            .map(|(name, cell)| (name.clone(), cell.load(Ordering::Relaxed)))
            .filter(|(_, value)| *value > 0)
            .collect()
    }
}

impl MetricRegistry for InMemoryMetricRegistry {
    fn counter(&self, name: &str) -> Counter {
        let Ok(mut cells) = self.cells.lock() else {
            return Counter::noop();
        };
        let cell = cells.counters.entry(name.to_owned()).or_default().clone();
        Counter::from_arc(cell)
    }

    fn histogram(&self, name: &str) -> Histogram {
        let Ok(mut cells) = self.cells.lock() else {
            return Histogram::noop();
        };
        let cell = cells.histograms.entry(name.to_owned()).or_default().clone();
        Histogram::from_arc(cell)
    }

    fn remove_matching(&self, prefix: &str) -> usize {
        let Ok(mut cells) = self.cells.lock() else {
            return 0;
        };
        let before = cells.counters.len() + cells.histograms.len();
        cells.counters.retain(|name, _| !name.starts_with(prefix));
        cells.histograms.retain(|name, _| !name.starts_with(prefix));
        before - (cells.counters.len() + cells.histograms.len())
    }
}
