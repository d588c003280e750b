//! Rule-based SBA loan eligibility screening.
//!
//! Every program in [`LOAN_PROGRAMS`] carries one predicate. Predicates are
//! independent: each is evaluated against the same profile and the report
//! lists every program whose predicate holds, in table order.

use serde::Serialize;

use crate::model::{Dataset, Record, ScalarValue, Summary};

pub const GENERAL_NOTE: &str =
    "These are preliminary assessments. Consult with an SBA lender for detailed eligibility.";
pub const LIKELY_ELIGIBLE: &str = "Likely Eligible";

/// Inputs to the eligibility screen.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BusinessProfile {
    pub annual_revenue: f64,
    pub employees: u32,
    pub years_in_business: u32,
    pub credit_score: u32,
}

/// One row of the static loan program table.
pub struct LoanProgram {
    pub name: &'static str,
    pub max_loan_amount: &'static str,
    pub rate_type: &'static str,
    pub base_rate: &'static str,
    pub typical_spread: &'static str,
    pub guarantee: &'static str,
    pub use_case: &'static str,
    /// Fixed note attached to an eligibility recommendation.
    pub note: &'static str,
    pub eligible: fn(&BusinessProfile) -> bool,
}

pub static LOAN_PROGRAMS: [LoanProgram; 4] = [
    LoanProgram {
        name: "SBA 7(a) Loan",
        max_loan_amount: "$5,000,000",
        rate_type: "Variable",
        base_rate: "Prime Rate + spread",
        typical_spread: "2.25% - 2.75%",
        guarantee: "75-85%",
        use_case: "Working capital, equipment, real estate",
        note: "Good for working capital, equipment, and real estate",
        eligible: |p| p.annual_revenue <= 30_000_000.0 && p.employees <= 500,
    },
    LoanProgram {
        name: "SBA 504 Loan",
        max_loan_amount: "$5,500,000",
        rate_type: "Fixed",
        base_rate: "10-year Treasury + spread",
        typical_spread: "~2.0%",
        guarantee: "Up to 40%",
        use_case: "Real estate, equipment (long-term fixed assets)",
        note: "Best for purchasing real estate or equipment",
        eligible: |p| {
            p.annual_revenue <= 30_000_000.0 && p.employees <= 500 && p.years_in_business >= 2
        },
    },
    LoanProgram {
        name: "SBA Microloan",
        max_loan_amount: "$50,000",
        rate_type: "Variable",
        base_rate: "Varies by intermediary",
        typical_spread: "8% - 13%",
        guarantee: "N/A",
        use_case: "Working capital, inventory, supplies",
        note: "Good for small capital needs",
        eligible: |p| p.annual_revenue <= 5_000_000.0,
    },
    LoanProgram {
        name: "SBA Express Loan",
        max_loan_amount: "$500,000",
        rate_type: "Variable or Fixed",
        base_rate: "Prime Rate + spread",
        typical_spread: "4.5% - 6.5%",
        guarantee: "50%",
        use_case: "Quick funding, working capital",
        note: "Fast approval process",
        eligible: |p| p.credit_score >= 680 && p.years_in_business >= 1,
    },
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub program: &'static str,
    pub eligible: &'static str,
    pub max_amount: &'static str,
    pub notes: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EligibilityReport {
    pub profile: BusinessProfile,
    pub recommended_programs: Vec<Recommendation>,
    pub general_notes: &'static str,
}

impl EligibilityReport {
    pub fn program_names(&self) -> Vec<&'static str> {
        self.recommended_programs.iter().map(|r| r.program).collect()
    }

    /// Recommendations as records with the profile echoed in the summary.
    pub fn to_dataset(&self) -> Dataset {
        let records = self
            .recommended_programs
            .iter()
            .map(|r| {
                Record::new()
                    .with("program", r.program)
                    .with("eligible", r.eligible)
                    .with("max_amount", r.max_amount)
                    .with("notes", r.notes)
            })
            .collect();
        let summary: Summary = [
            ("business_revenue", ScalarValue::from(self.profile.annual_revenue)),
            ("employee_count", ScalarValue::from(self.profile.employees)),
            ("years_in_business", ScalarValue::from(self.profile.years_in_business)),
            ("credit_score", ScalarValue::from(self.profile.credit_score)),
            ("general_notes", ScalarValue::from(self.general_notes)),
        ]
        .into_iter()
        .collect();

        Dataset::new(
            "Eligibility",
            &["program", "eligible", "max_amount", "notes"],
            records,
        )
        .with_summary(summary)
    }
}

/// Screens a profile against every program in the table.
pub fn classify(profile: &BusinessProfile) -> EligibilityReport {
    let recommended_programs = LOAN_PROGRAMS
        .iter()
        .filter(|program| (program.eligible)(profile))
        .map(|program| Recommendation {
            program: program.name,
            eligible: LIKELY_ELIGIBLE,
            max_amount: program.max_loan_amount,
            notes: program.note,
        })
        .collect();

    EligibilityReport {
        profile: *profile,
        recommended_programs,
        general_notes: GENERAL_NOTE,
    }
}
