// Copyright 2025 Fernando Borretti
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The FSRS memory model formulas.

use std::fmt::Display;
use std::fmt::Formatter;
use std::str::FromStr;

use rusqlite::ToSql;
use rusqlite::types::FromSql;
use rusqlite::types::FromSqlError;
use rusqlite::types::FromSqlResult;
use rusqlite::types::ToSqlOutput;
use rusqlite::types::ValueRef;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ErrorReport;
use crate::error::fail;

/// Retrievability: the probability of recall, in [0, 1].
pub type Retrievability = f64;

/// Stability: the interval, in days, at which retrievability falls to 90%.
pub type Stability = f64;

/// Difficulty, in [1, 10].
pub type Difficulty = f64;

/// Time, in days.
pub type T = f64;

pub const MIN_DIFFICULTY: Difficulty = 1.0;
pub const MAX_DIFFICULTY: Difficulty = 10.0;
pub const MIN_STABILITY: Stability = 0.01;

const F: f64 = 19.0 / 81.0;
const C: f64 = -0.5;

/// Default FSRS-5 weights.
const W: [f64; 19] = [
    0.40255, 1.18385, 3.173, 15.69105, 7.1949, 0.5345, 1.4604, 0.0046, 1.54575, 0.1192, 1.01925,
    1.9395, 0.11, 0.29605, 2.2698, 0.2315, 2.9898, 0.51655, 0.6621,
];

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Rating {
    Again,
    Hard,
    Good,
    Easy,
}

impl Rating {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::Again => "Again",
            Rating::Hard => "Hard",
            Rating::Good => "Good",
            Rating::Easy => "Easy",
        }
    }

    fn weight_index(self) -> usize {
        match self {
            Rating::Again => 0,
            Rating::Hard => 1,
            Rating::Good => 2,
            Rating::Easy => 3,
        }
    }
}

impl From<Rating> for f64 {
    fn from(value: Rating) -> Self {
        match value {
            Rating::Again => 1.0,
            Rating::Hard => 2.0,
            Rating::Good => 3.0,
            Rating::Easy => 4.0,
        }
    }
}

impl Display for Rating {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Rating {
    type Err = ErrorReport;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Again" => Ok(Rating::Again),
            "Hard" => Ok(Rating::Hard),
            "Good" => Ok(Rating::Good),
            "Easy" => Ok(Rating::Easy),
            _ => fail(format!("invalid rating: {s}")),
        }
    }
}

impl ToSql for Rating {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Rating {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let string: String = FromSql::column_result(value)?;
        string
            .parse()
            .map_err(|e: ErrorReport| FromSqlError::Other(Box::new(e)))
    }
}

pub fn retrievability(t: T, s: Stability) -> Retrievability {
    (1.0 + F * (t / s)).powf(C)
}

/// The interval, in days, after which retrievability decays to `r_d`.
pub fn interval(r_d: Retrievability, s: Stability) -> T {
    (s / F) * (r_d.powf(1.0 / C) - 1.0)
}

pub fn initial_stability(rating: Rating) -> Stability {
    W[rating.weight_index()]
}

pub fn initial_difficulty(rating: Rating) -> Difficulty {
    let g: f64 = rating.into();
    clamp_d(W[4] - f64::exp(W[5] * (g - 1.0)) + 1.0)
}

pub fn new_stability(d: Difficulty, s: Stability, r: Retrievability, rating: Rating) -> Stability {
    if rating == Rating::Again {
        s_fail(d, s, r)
    } else {
        s_success(d, s, r, rating)
    }
}

pub fn new_difficulty(d: Difficulty, rating: Rating) -> Difficulty {
    clamp_d(W[7] * initial_difficulty(Rating::Easy) + (1.0 - W[7]) * dp(d, rating))
}

fn s_success(d: Difficulty, s: Stability, r: Retrievability, rating: Rating) -> Stability {
    let t_d = 11.0 - d;
    let t_s = s.powf(-W[9]);
    let t_r = f64::exp(W[10] * (1.0 - r)) - 1.0;
    let h = if rating == Rating::Hard { W[15] } else { 1.0 };
    let b = if rating == Rating::Easy { W[16] } else { 1.0 };
    let c = f64::exp(W[8]);
    let alpha = 1.0 + t_d * t_s * t_r * h * b * c;
    s * alpha
}

fn s_fail(d: Difficulty, s: Stability, r: Retrievability) -> Stability {
    let d_f = d.powf(-W[12]);
    let s_f = (s + 1.0).powf(W[13]) - 1.0;
    let r_f = f64::exp(W[14] * (1.0 - r));
    let c_f = W[11];
    let s_f = d_f * s_f * r_f * c_f;
    f64::min(s_f, s).max(MIN_STABILITY)
}

fn dp(d: Difficulty, rating: Rating) -> f64 {
    d + delta_d(rating) * ((10.0 - d) / 9.0)
}

fn delta_d(rating: Rating) -> f64 {
    let g: f64 = rating.into();
    -W[6] * (g - 3.0)
}

pub fn clamp_d(d: Difficulty) -> Difficulty {
    if d.is_nan() {
        return MIN_DIFFICULTY;
    }
    d.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

pub fn clamp_s(s: Stability) -> Stability {
    if s.is_nan() {
        return MIN_STABILITY;
    }
    s.max(MIN_STABILITY)
}
