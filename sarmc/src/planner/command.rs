use std::path::{Path, PathBuf};
use std::process::Command;

use super::{parse_plan_output, Plan, PlannerError, PlannerFacade};
use crate::config::PlannerConfig;
use crate::knowledge::PlanningProblem;

/// Runs an external planner binary on a problem file.
///
/// Each `solve` renders the problem into a fresh temporary directory,
/// substitutes `{domain}` and `{problem}` in the configured command
/// arguments, waits for the process and parses its standard output. There is
/// no timeout: a planner that never returns stalls the caller.
#[derive(Debug, Clone)]
pub struct CommandPlanner {
    program: String,
    args: Vec<String>,
    domain_file: PathBuf,
    domain_name: String,
    problem_name: String,
}

impl CommandPlanner {
    pub fn from_config(config: &PlannerConfig) -> Result<Self, PlannerError> {
        let (program, args) = config
            .command
            .split_first()
            .ok_or_else(|| PlannerError::NotConfigured("planner.command is empty".to_string()))?;
        let domain_file = config
            .domain_file
            .clone()
            .ok_or_else(|| PlannerError::NotConfigured("planner.domain_file is not set".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            domain_file,
            domain_name: config.domain_name.clone(),
            problem_name: config.problem_name.clone(),
        })
    }

    fn expand_args(&self, problem_file: &Path) -> Vec<String> {
        let domain = self.domain_file.display().to_string();
        let problem = problem_file.display().to_string();
        self.args
            .iter()
            .map(|arg| arg.replace("{domain}", &domain).replace("{problem}", &problem))
            .collect()
    }
}

impl PlannerFacade for CommandPlanner {
    fn solve(&mut self, problem: &PlanningProblem<'_>) -> Result<Option<Plan>, PlannerError> {
        let workdir = tempfile::tempdir()?;
        let problem_file = workdir.path().join("problem.pddl");
        std::fs::write(
            &problem_file,
            problem.to_pddl(&self.problem_name, &self.domain_name),
        )?;

        let args = self.expand_args(&problem_file);
        log::debug!("Running planner: {} {}", self.program, args.join(" "));
        let output = Command::new(&self.program).args(&args).output()?;

        if !output.status.success() {
            return Err(PlannerError::CommandFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        parse_plan_output(&String::from_utf8_lossy(&output.stdout))
    }
}
