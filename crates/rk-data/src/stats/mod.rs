//! Descriptive statistics: box plots and histograms
//!
//! Missing values (NaN) are dropped before any computation and counted
//! separately. Empty input never fails; it yields NaN summaries and zero
//! counts so renderers can show "no data".

use once_cell::sync::OnceCell;

use crate::mapping::MappingFunction;

/// Quantile of sorted values using linear interpolation at `(n - 1) * p`
pub fn quantile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let idx = (sorted.len() - 1) as f64 * p.clamp(0.0, 1.0);
    interpolate(sorted, idx)
}

fn interpolate(sorted: &[f64], idx: f64) -> f64 {
    let lower = idx.floor() as usize;
    let upper = idx.ceil() as usize;

    if lower == upper || upper >= sorted.len() {
        sorted[lower]
    } else {
        let fraction = idx - lower as f64;
        sorted[lower] * (1.0 - fraction) + sorted[upper] * fraction
    }
}

/// Sturges' rule: `ceil(log2(n) + 1)`, at least one bin
pub fn sturges_bins(n: usize) -> usize {
    if n == 0 {
        return 1;
    }
    ((n as f64).log2() + 1.0).ceil() as usize
}

/// Immutable box plot summary
///
/// Built once from a value sequence; quartiles, mean and outliers are
/// computed on first access and cached for the lifetime of the instance.
#[derive(Debug)]
pub struct BoxPlot {
    sorted: Vec<f64>,
    missing: usize,
    quartiles: OnceCell<(f64, f64, f64)>,
    mean: OnceCell<f64>,
    outliers: OnceCell<Vec<f64>>,
}

impl Clone for BoxPlot {
    fn clone(&self) -> Self {
        Self::from_sorted(self.sorted.clone(), self.missing)
    }
}

impl BoxPlot {
    fn from_sorted(sorted: Vec<f64>, missing: usize) -> Self {
        Self {
            sorted,
            missing,
            quartiles: OnceCell::new(),
            mean: OnceCell::new(),
            outliers: OnceCell::new(),
        }
    }

    /// Number of non-missing values
    pub fn count(&self) -> usize {
        self.sorted.len()
    }

    pub fn missing(&self) -> usize {
        self.missing
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    /// The non-missing values in ascending order
    pub fn values(&self) -> &[f64] {
        &self.sorted
    }

    pub fn min(&self) -> f64 {
        self.sorted.first().copied().unwrap_or(f64::NAN)
    }

    pub fn max(&self) -> f64 {
        self.sorted.last().copied().unwrap_or(f64::NAN)
    }

    fn quartiles(&self) -> (f64, f64, f64) {
        *self.quartiles.get_or_init(|| {
            (
                quantile(&self.sorted, 0.25),
                quantile(&self.sorted, 0.5),
                quantile(&self.sorted, 0.75),
            )
        })
    }

    pub fn q1(&self) -> f64 {
        self.quartiles().0
    }

    pub fn median(&self) -> f64 {
        self.quartiles().1
    }

    pub fn q3(&self) -> f64 {
        self.quartiles().2
    }

    pub fn mean(&self) -> f64 {
        *self.mean.get_or_init(|| {
            if self.sorted.is_empty() {
                f64::NAN
            } else {
                self.sorted.iter().sum::<f64>() / self.sorted.len() as f64
            }
        })
    }

    pub fn iqr(&self) -> f64 {
        self.q3() - self.q1()
    }

    /// Lower whisker bound, `q1 - 1.5 * IQR`
    pub fn whisker_low(&self) -> f64 {
        self.q1() - 1.5 * self.iqr()
    }

    /// Upper whisker bound, `q3 + 1.5 * IQR`
    pub fn whisker_high(&self) -> f64 {
        self.q3() + 1.5 * self.iqr()
    }

    /// Values outside the whisker bounds, ascending
    pub fn outliers(&self) -> &[f64] {
        self.outliers.get_or_init(|| {
            let (low, high) = (self.whisker_low(), self.whisker_high());
            self.sorted
                .iter()
                .copied()
                .filter(|&v| v < low || v > high)
                .collect()
        })
    }

    /// Summary statistic selected by a sort method name
    pub fn statistic(&self, method: SortMethod) -> f64 {
        match method {
            SortMethod::Min => self.min(),
            SortMethod::Max => self.max(),
            SortMethod::Median => self.median(),
            SortMethod::Q1 => self.q1(),
            SortMethod::Q3 => self.q3(),
            SortMethod::Mean => self.mean(),
        }
    }
}

/// Summary statistic used to sort or filter box plot values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortMethod {
    Min,
    Max,
    #[default]
    Median,
    Q1,
    Q3,
    Mean,
}

impl SortMethod {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "min" => SortMethod::Min,
            "max" => SortMethod::Max,
            "median" => SortMethod::Median,
            "q1" => SortMethod::Q1,
            "q3" => SortMethod::Q3,
            "mean" => SortMethod::Mean,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortMethod::Min => "min",
            SortMethod::Max => "max",
            SortMethod::Median => "median",
            SortMethod::Q1 => "q1",
            SortMethod::Q3 => "q3",
            SortMethod::Mean => "mean",
        }
    }
}

/// Build a box plot
///
/// With a mapping, every statistic (including outlier detection) is
/// computed on the mapped values, not on the raw ones.
pub fn compute_box_plot(values: impl IntoIterator<Item = f64>, mapping: Option<&MappingFunction>) -> BoxPlot {
    let mut missing = 0;
    let mut sorted: Vec<f64> = values
        .into_iter()
        .map(|v| match mapping {
            Some(m) => m.apply(v),
            None => v,
        })
        .filter(|v| {
            let keep = !v.is_nan();
            if !keep {
                missing += 1;
            }
            keep
        })
        .collect();
    sorted.sort_by(f64::total_cmp);
    BoxPlot::from_sorted(sorted, missing)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bin {
    /// Inclusive lower edge
    pub x0: f64,
    /// Exclusive upper edge; the last bin includes it
    pub x1: f64,
    pub count: usize,
}

/// Numeric histogram over raw values
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub domain: [f64; 2],
    pub bins: Vec<Bin>,
    pub count: usize,
    pub missing: usize,
    pub max_bin: usize,
}

/// Build a numeric histogram
///
/// The domain defaults to the value extent and the bin count to Sturges'
/// rule. Values outside an explicit domain are clamped into the edge bins.
pub fn compute_histogram(values: impl IntoIterator<Item = f64>, domain: Option<[f64; 2]>, bins: Option<usize>) -> Histogram {
    let mut missing = 0;
    let present: Vec<f64> = values
        .into_iter()
        .filter(|v| {
            let keep = !v.is_nan();
            if !keep {
                missing += 1;
            }
            keep
        })
        .collect();

    let domain = domain.unwrap_or_else(|| {
        if present.is_empty() {
            [f64::NAN, f64::NAN]
        } else {
            let min = present.iter().copied().fold(f64::INFINITY, f64::min);
            let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            [min, max]
        }
    });

    if domain[0].is_nan() || domain[1].is_nan() {
        return Histogram {
            domain,
            bins: Vec::new(),
            count: 0,
            missing,
            max_bin: 0,
        };
    }

    let n_bins = bins.filter(|b| *b > 0).unwrap_or_else(|| sturges_bins(present.len()));
    let width = (domain[1] - domain[0]) / n_bins as f64;
    let mut result: Vec<Bin> = (0..n_bins)
        .map(|i| Bin {
            x0: domain[0] + width * i as f64,
            x1: if i + 1 == n_bins { domain[1] } else { domain[0] + width * (i + 1) as f64 },
            count: 0,
        })
        .collect();

    for v in &present {
        let idx = if width <= 0.0 {
            0
        } else {
            (((v - domain[0]) / width).floor().max(0.0) as usize).min(n_bins - 1)
        };
        result[idx].count += 1;
    }

    let max_bin = result.iter().map(|b| b.count).max().unwrap_or(0);
    Histogram {
        domain,
        bins: result,
        count: present.len(),
        missing,
        max_bin,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryBin {
    pub category: String,
    pub count: usize,
}

/// Category frequencies in declared category order
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalHistogram {
    pub bins: Vec<CategoryBin>,
    pub count: usize,
    pub missing: usize,
    pub max_bin: usize,
}

/// Tally category membership
///
/// Every declared category gets a bin (zero-filled). Absent values and
/// values outside the declared categories are counted as missing.
pub fn compute_categorical_histogram<S: AsRef<str>>(
    values: impl IntoIterator<Item = Option<S>>,
    categories: &[String],
) -> CategoricalHistogram {
    let mut counts = vec![0usize; categories.len()];
    let mut missing = 0;
    let mut count = 0;

    for value in values {
        let idx = value
            .as_ref()
            .and_then(|v| {
                let name: &str = v.as_ref();
                categories.iter().position(|c| c == name)
            });
        match idx {
            Some(idx) => {
                counts[idx] += 1;
                count += 1;
            }
            None => missing += 1,
        }
    }

    let max_bin = counts.iter().copied().max().unwrap_or(0);
    CategoricalHistogram {
        bins: categories
            .iter()
            .zip(counts)
            .map(|(category, count)| CategoryBin {
                category: category.clone(),
                count,
            })
            .collect(),
        count,
        missing,
        max_bin,
    }
}
