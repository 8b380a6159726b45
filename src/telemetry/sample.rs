use serde::{Deserialize, Serialize};

/// The six signed axes carried by one notification, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Axes {
    pub ax: i8,
    pub ay: i8,
    pub az: i8,
    pub gx: i8,
    pub gy: i8,
    pub gz: i8,
}

/// A point-in-time reading. `t` is seconds since the engine started.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub t: f64,
    pub ax: i8,
    pub ay: i8,
    pub az: i8,
    pub gx: i8,
    pub gy: i8,
    pub gz: i8,
    pub pitch: Option<f64>,
}

impl Sample {
    pub fn new(t: f64, axes: Axes) -> Self {
        Self {
            t,
            ax: axes.ax,
            ay: axes.ay,
            az: axes.az,
            gx: axes.gx,
            gy: axes.gy,
            gz: axes.gz,
            pitch: None,
        }
    }

    pub fn axes(&self) -> Axes {
        Axes {
            ax: self.ax,
            ay: self.ay,
            az: self.az,
            gx: self.gx,
            gy: self.gy,
            gz: self.gz,
        }
    }
}

/// Column-oriented history: one vector per field, all the same length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleSeries {
    pub t: Vec<f64>,
    pub ax: Vec<i8>,
    pub ay: Vec<i8>,
    pub az: Vec<i8>,
    pub gx: Vec<i8>,
    pub gy: Vec<i8>,
    pub gz: Vec<i8>,
    pub pitch: Vec<Option<f64>>,
}

impl SampleSeries {
    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    pub fn push(&mut self, sample: &Sample) {
        self.t.push(sample.t);
        self.ax.push(sample.ax);
        self.ay.push(sample.ay);
        self.az.push(sample.az);
        self.gx.push(sample.gx);
        self.gy.push(sample.gy);
        self.gz.push(sample.gz);
        self.pitch.push(sample.pitch);
    }
}

impl<'a> FromIterator<&'a Sample> for SampleSeries {
    fn from_iter<I: IntoIterator<Item = &'a Sample>>(iter: I) -> Self {
        let mut series = SampleSeries::default();
        for sample in iter {
            series.push(sample);
        }
        series
    }
}
