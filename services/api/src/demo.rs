use crate::infra::InMemoryScreeningRepository;
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tenant_screening::config::{AppConfig, ScreeningConfig};
use tenant_screening::error::AppError;
use tenant_screening::workflows::screening::{
    standard_orchestrator, AdditionalInfo, Address, ApplicantDetails, EmploymentDetails,
    EmploymentStatus, FailurePolicy, FinalReport, Orchestrator, OrchestratorConfig,
    ProcessorConfig, RentalHistory, ScreeningProcessor, ScreeningService, ScreeningServiceError,
    ScreeningSubmission, StageStatus, SyntheticCreditBureau,
};

#[derive(Args, Debug)]
pub(crate) struct ScreenArgs {
    /// JSON file holding a screening submission
    #[arg(long)]
    pub(crate) input: PathBuf,
    /// Skip later waves as soon as any stage fails
    #[arg(long)]
    pub(crate) fail_fast: bool,
    /// Print the full report as JSON instead of a summary
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Include every stage result in the output
    #[arg(long)]
    pub(crate) show_stages: bool,
    /// Run the demo pipeline under the fail-fast policy
    #[arg(long)]
    pub(crate) fail_fast: bool,
}

pub(crate) async fn run_screen(args: ScreenArgs) -> Result<(), AppError> {
    let ScreenArgs {
        input,
        fail_fast,
        json,
    } = args;

    let submission = load_submission(&input)?;
    let config = AppConfig::load()?;
    let orchestrator = build_orchestrator(&config.screening, fail_fast)?;

    let report = orchestrator.run(submission).await?;
    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(err) => println!("Report unavailable: {err}"),
        }
    } else {
        print!("{}", render_report(&report, true));
    }

    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        show_stages,
        fail_fast,
    } = args;

    let config = ScreeningConfig::default();
    let orchestrator = Arc::new(build_orchestrator(&config, fail_fast)?);
    let repository = Arc::new(InMemoryScreeningRepository::default());
    let service = Arc::new(ScreeningService::new(orchestrator, repository.clone()));

    println!("Tenant screening demo (synthetic credit bureau)");
    for (label, submission) in sample_applicants() {
        match service.submit(submission) {
            Ok(record) => println!(
                "- Received {label} as {} -> status {}",
                record.application_id,
                record.status.label()
            ),
            Err(err) => println!("- {label} rejected at intake: {err}"),
        }
    }

    let processor = ScreeningProcessor::new(service, ProcessorConfig::from(&config));
    match processor.run_once().await {
        Ok(summary) => println!(
            "\nProcessed {} application(s): {} screened, {} failed",
            summary.processed, summary.successful, summary.failed
        ),
        Err(err) => {
            println!("\nBatch unavailable: {err}");
            return Ok(());
        }
    }

    let records = repository.all().map_err(ScreeningServiceError::from)?;
    for record in records {
        let view = record.status_view();
        println!("\nApplication {} -> {}", view.application_id, view.status);
        println!("  Rationale: {}", view.decision_rationale);
        if let Some(report) = &record.report {
            for line in render_report(report, show_stages).lines() {
                println!("  {line}");
            }
        }
    }

    Ok(())
}

pub(crate) fn print_plan() -> Result<(), AppError> {
    let orchestrator = build_orchestrator(&ScreeningConfig::default(), false)?;
    print!("{}", render_plan(&orchestrator));
    Ok(())
}

fn build_orchestrator(config: &ScreeningConfig, fail_fast: bool) -> Result<Orchestrator, AppError> {
    let mut orchestrator_config = OrchestratorConfig::from(config);
    if fail_fast {
        orchestrator_config = orchestrator_config.with_failure_policy(FailurePolicy::FailFast);
    }
    let orchestrator = standard_orchestrator(
        Arc::new(SyntheticCreditBureau::default()),
        orchestrator_config,
    )?;
    Ok(orchestrator)
}

pub(crate) fn load_submission(path: &Path) -> Result<ScreeningSubmission, AppError> {
    let raw = std::fs::read_to_string(path)?;
    let submission: ScreeningSubmission = serde_json::from_str(&raw)?;
    submission
        .validate()
        .map_err(ScreeningServiceError::from)?;
    Ok(submission)
}

pub(crate) fn render_plan(orchestrator: &Orchestrator) -> String {
    let graph = orchestrator.graph();
    let mut out = String::from("Standard screening pipeline\n");
    for (index, wave) in orchestrator.plan().waves().iter().enumerate() {
        out.push_str(&format!("wave {index}:\n"));
        for stage in wave {
            let dependencies = graph.dependencies(stage).unwrap_or_default();
            if dependencies.is_empty() {
                out.push_str(&format!("  - {stage}\n"));
            } else {
                out.push_str(&format!("  - {stage} (after {})\n", dependencies.join(", ")));
            }
        }
    }
    out
}

pub(crate) fn render_report(report: &FinalReport, show_stages: bool) -> String {
    let mut out = format!(
        "Screening {} {} in {} ms\n",
        report.screening_id,
        report.status.label(),
        report.processing_time_ms
    );

    match report.decision() {
        Some(outcome) => {
            out.push_str(&format!(
                "Decision: {} (confidence {}%)\n",
                outcome.decision.label(),
                outcome.confidence
            ));
            if let Some(score) = outcome.credit_score {
                out.push_str(&format!("Credit score: {score}\n"));
            }
            if let Some(score) = outcome.risk_score {
                out.push_str(&format!("Risk score: {score} / 1000\n"));
            }
            for condition in &outcome.conditions {
                out.push_str(&format!("Condition: {condition}\n"));
            }
            out.push_str(&format!("Reasoning: {}\n", outcome.reasoning));
        }
        None => out.push_str("Decision: unavailable\n"),
    }

    if !report.failed_stages.is_empty() {
        out.push_str(&format!(
            "Failed stages: {}\n",
            report.failed_stages.join(", ")
        ));
    }

    if show_stages {
        out.push_str("Stages:\n");
        for result in &report.stage_results {
            let detail = match (result.payload(), result.failure_detail()) {
                (Some(payload), _) => payload.summary(),
                (None, Some(failure)) => failure.to_string(),
                (None, None) => String::new(),
            };
            let marker = match result.status() {
                StageStatus::Success => "ok",
                StageStatus::Error => "!!",
            };
            out.push_str(&format!(
                "  [{marker}] {:<10} {:>5} ms  {detail}\n",
                result.stage, result.duration_ms
            ));
        }
    }

    out
}

pub(crate) fn sample_applicants() -> Vec<(&'static str, ScreeningSubmission)> {
    vec![
        (
            "Jordan Rivera (salaried, long tenure)",
            ScreeningSubmission {
                applicant: ApplicantDetails {
                    first_name: "Jordan".to_string(),
                    last_name: "Rivera".to_string(),
                    email: "jordan.rivera@example.com".to_string(),
                    phone: "515-555-0142".to_string(),
                    ssn: "123-45-6789".to_string(),
                    date_of_birth: "1988-04-12".to_string(),
                    current_address: Address {
                        street: "410 Grand Ave".to_string(),
                        city: "Des Moines".to_string(),
                        state: "IA".to_string(),
                        zip: "50309".to_string(),
                    },
                },
                employment: EmploymentDetails {
                    employer_name: "Principal Financial".to_string(),
                    job_title: "Software Engineer".to_string(),
                    employment_status: EmploymentStatus::FullTime,
                    annual_income: 120_000,
                    years_employed: 4.0,
                    employer_phone: "515-555-0100".to_string(),
                },
                rental_history: Some(RentalHistory {
                    current_landlord: Some("Riverfront Lofts".to_string()),
                    current_landlord_phone: Some("515-555-0199".to_string()),
                    monthly_rent: Some(1_400),
                    years_at_current: Some(3.0),
                    reason_for_leaving: Some("Relocating closer to work".to_string()),
                }),
                additional_info: AdditionalInfo::default(),
                desired_monthly_rent: Some(1_800),
            },
        ),
        (
            "Casey Morgan (part-time, recent move)",
            ScreeningSubmission {
                applicant: ApplicantDetails {
                    first_name: "Casey".to_string(),
                    last_name: "Morgan".to_string(),
                    email: "casey.morgan@example.com".to_string(),
                    phone: "319-555-0175".to_string(),
                    ssn: "234-56-7890".to_string(),
                    date_of_birth: "1996-11-03".to_string(),
                    current_address: Address {
                        street: "88 Dubuque St".to_string(),
                        city: "Iowa City".to_string(),
                        state: "IA".to_string(),
                        zip: "52240".to_string(),
                    },
                },
                employment: EmploymentDetails {
                    employer_name: "Prairie Lights Books".to_string(),
                    job_title: "Store Assistant".to_string(),
                    employment_status: EmploymentStatus::PartTime,
                    annual_income: 52_000,
                    years_employed: 1.5,
                    employer_phone: "319-555-0110".to_string(),
                },
                rental_history: Some(RentalHistory {
                    current_landlord: Some("Northside Apartments".to_string()),
                    current_landlord_phone: None,
                    monthly_rent: Some(1_100),
                    years_at_current: Some(0.8),
                    reason_for_leaving: Some("Needs a second bedroom".to_string()),
                }),
                additional_info: AdditionalInfo {
                    pets: true,
                    ..AdditionalInfo::default()
                },
                desired_monthly_rent: Some(1_650),
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenant_screening::workflows::screening::ScreeningDecision;

    #[test]
    fn sample_applicants_pass_intake() {
        let samples = sample_applicants();

        assert_eq!(samples.len(), 2);
        for (label, submission) in samples {
            assert!(submission.validate().is_ok(), "{label} should validate");
        }
    }

    #[test]
    fn plan_lists_every_wave() {
        let orchestrator =
            build_orchestrator(&ScreeningConfig::default(), false).expect("pipeline builds");

        let rendered = render_plan(&orchestrator);

        assert!(rendered.contains("wave 0:\n  - ingestion\n  - identity\n"));
        assert!(rendered.contains("  - audit (after decision, compliance, bias)"));
        assert!(!rendered.contains("wave 6"));
    }

    #[tokio::test]
    async fn sample_applicants_reach_distinct_decisions() {
        let orchestrator =
            build_orchestrator(&ScreeningConfig::default(), false).expect("pipeline builds");
        let mut decisions = Vec::new();

        for (_, submission) in sample_applicants() {
            let report = orchestrator.run(submission).await.expect("screening runs");
            let rendered = render_report(&report, true);
            assert!(rendered.contains(report.screening_id.as_str()));
            assert!(rendered.contains("[ok] audit"));
            decisions.push(report.decision().map(|outcome| outcome.decision));
        }

        assert_eq!(
            decisions,
            vec![
                Some(ScreeningDecision::Approve),
                Some(ScreeningDecision::ConditionalApprove)
            ]
        );
    }

    #[test]
    fn load_submission_reports_unreadable_input() {
        let path = std::env::temp_dir().join("tenant-screening-missing-input.json");
        let _ = std::fs::remove_file(&path);

        assert!(matches!(load_submission(&path), Err(AppError::Io(_))));
    }

    #[test]
    fn load_submission_validates_the_payload() {
        let path = std::env::temp_dir().join(format!(
            "tenant-screening-invalid-{}.json",
            std::process::id()
        ));
        let mut submission = sample_applicants().remove(0).1;
        submission.applicant.ssn = String::new();
        std::fs::write(&path, serde_json::to_vec(&submission).expect("serialize"))
            .expect("write fixture");

        let result = load_submission(&path);
        let _ = std::fs::remove_file(&path);

        assert!(matches!(
            result,
            Err(AppError::Screening(ScreeningServiceError::Validation(_)))
        ));
    }
}
