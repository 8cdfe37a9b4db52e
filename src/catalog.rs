//! Agent personas and task declarations.
//!
//! The built-in catalog is the Design-Thinking pipeline: Initialization and
//! Empathy Map, As-Is scenario, To-Be scenario, Big Idea vignettes, Hills,
//! and a final overview. A TOML file with the same shape can replace it:
//!
//! ```toml
//! [agents.researcher]
//! role = "User Researcher"
//! goal = "..."
//! backstory = "..."
//!
//! [[tasks]]
//! name = "persona"
//! agent = "researcher"
//! description = "Create a persona aged {age}"
//! dynamic_params = [{ name = "age", min = 18, max = 60 }]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::agent::{AgentPersona, AgentRegistry, LanguageModel};
use crate::core::table::TaskTable;
use crate::core::task::TaskDefinition;
use crate::error::{Error, Result};
use crate::ilog_debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Catalog {
    #[serde(default)]
    pub agents: BTreeMap<String, AgentPersona>,
    #[serde(default)]
    pub tasks: Vec<TaskDefinition>,
}

impl Catalog {
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        ilog_debug!("Catalog::load path={}", path.display());
        if !path.exists() {
            return Err(Error::Configuration(format!(
                "catalog file not found: {}",
                path.display()
            )));
        }
        let contents = fs::read_to_string(path)?;
        let catalog = Self::from_toml(&contents)?;
        ilog_debug!(
            "Catalog loaded: {} agents, {} tasks",
            catalog.agents.len(),
            catalog.tasks.len()
        );
        Ok(catalog)
    }

    /// Load `path` if given, otherwise the built-in catalog.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::builtin()),
        }
    }

    pub fn registry(&self, backend: Arc<dyn LanguageModel>) -> AgentRegistry {
        AgentRegistry::new(
            self.agents
                .iter()
                .map(|(name, persona)| (name.clone(), persona.clone())),
            backend,
        )
    }

    /// Build the definition table; fails on duplicate task names.
    pub fn table(&self) -> Result<TaskTable> {
        TaskTable::from_definitions(self.tasks.iter().cloned())
    }

    pub fn builtin() -> Self {
        Self {
            agents: builtin_agents(),
            tasks: builtin_tasks(),
        }
    }
}

fn persona(role: &str, goal: &str, backstory: &str) -> AgentPersona {
    AgentPersona::new(role, goal, backstory)
}

fn builtin_agents() -> BTreeMap<String, AgentPersona> {
    [
        (
            "design_facilitator",
            persona(
                "Lead Design Thinking Facilitator",
                "Orchestrate the session and merge every phase into one coherent result",
                "You have run hundreds of Design Thinking workshops and know how to turn \
                 divergent proposals into a decision the whole team can stand behind.",
            ),
        ),
        (
            "ux_designer",
            persona(
                "UX Specialist",
                "Surface user behaviors, frictions and design insights",
                "A senior mobile UX designer who reads interaction patterns the way \
                 others read text.",
            ),
        ),
        (
            "product_manager",
            persona(
                "Product Strategist",
                "Align the design with product and business objectives",
                "You shipped several consumer apps and care about scope, value and \
                 what a first release must contain.",
            ),
        ),
        (
            "business_strategist",
            persona(
                "Commercial Analyst",
                "Evaluate business viability and market fit",
                "A former consultant who stress-tests every idea against revenue, cost \
                 and competition.",
            ),
        ),
        (
            "data_analyst",
            persona(
                "Insights Specialist",
                "Ground design decisions in evidence and consistent reasoning",
                "You compare alternatives systematically and flag contradictions in \
                 research material.",
            ),
        ),
        (
            "researcher",
            persona(
                "User Researcher",
                "Conduct thorough user research and build realistic personas",
                "An ethnographer turned product researcher, experienced in interviews \
                 and field observation.",
            ),
        ),
        (
            "creative_facilitator",
            persona(
                "Innovation Catalyst",
                "Push ideation beyond the obvious",
                "You run creative sessions and know how to reframe a problem until \
                 new options appear.",
            ),
        ),
        (
            "innovation_coach",
            persona(
                "Change Agent",
                "Challenge assumptions and foster bold but grounded innovation",
                "A coach who asks the uncomfortable question early so the team does \
                 not build on a weak premise.",
            ),
        ),
    ]
    .into_iter()
    .map(|(name, persona)| (name.to_string(), persona))
    .collect()
}

fn task(
    name: &str,
    agent: &str,
    deps: &[&str],
    description: &str,
    expected: &str,
) -> TaskDefinition {
    TaskDefinition::new(name, agent, description)
        .depends_on(deps.iter().copied())
        .expecting(expected)
}

const REFINEMENT: &str = "initialization_refinement";
const EMPATHY: &str = "empathy_map_synthesis";
const ASIS: &str = "asis_scenario_map_synthesis";
const TOBE: &str = "tobe_scenario_map_synthesis";
const BIG_IDEA: &str = "big_idea_vignettes_synthesis";
const HILLS: &str = "writing_hills_synthesis";

fn builtin_tasks() -> Vec<TaskDefinition> {
    let mut tasks = Vec::with_capacity(29);

    // Phase 1: persona and empathy
    tasks.push(
        task(
            "initialization_proposition_a",
            "researcher",
            &[],
            "Generate a random persona for a mobile app user, including a problem \
             statement that describes the pain points this person faces in daily life.",
            "A persona card (name, age, occupation, context) followed by the problem \
             statement and a numbered list of pain points.",
        )
        .with_param("age", 18, 60)
        .with_param("number_of_pain_points", 1, 9),
    );
    tasks.push(task(
        "initialization_challenge",
        "innovation_coach",
        &["initialization_proposition_a"],
        "Challenge the persona: identify assumptions, stereotypes and biases, and \
         point out pain points that are vague or implausible.",
        "A list of challenges, each with the assumption it targets.",
    ));
    tasks.push(task(
        REFINEMENT,
        "design_facilitator",
        &["initialization_proposition_a", "initialization_challenge"],
        "Refine the persona using the challenges raised. Keep the same age and number \
         of pain points.",
        "The refined persona card and problem statement.",
    ));
    tasks.push(task(
        "empathy_map_collect_a",
        "researcher",
        &[REFINEMENT],
        "Simulate a user interview with the persona. Capture what they say and think \
         about the problem.",
        "An interview transcript excerpt and the key quotes.",
    ));
    tasks.push(task(
        "empathy_map_verification",
        "data_analyst",
        &["empathy_map_collect_a"],
        "Verify the consistency and reliability of the interview material against \
         the persona.",
        "A list of consistent findings and a list of contradictions.",
    ));
    tasks.push(task(
        "empathy_map_collect_b",
        "ux_designer",
        &[REFINEMENT],
        "Simulate field observations of the persona. Capture what they do and feel \
         while facing the problem.",
        "Observation notes grouped by situation.",
    ));
    tasks.push(task(
        "empathy_map_comparison",
        "data_analyst",
        &[
            "empathy_map_collect_a",
            "empathy_map_verification",
            "empathy_map_collect_b",
        ],
        "Compare the interview insights with the observations. Highlight where \
         what the persona says and what they do diverge.",
        "A comparison table and the three most significant gaps.",
    ));
    tasks.push(task(
        EMPATHY,
        "design_facilitator",
        &[
            "empathy_map_collect_a",
            "empathy_map_collect_b",
            "empathy_map_comparison",
        ],
        "Synthesize the final empathy map of the persona.",
        "An empathy map with the Says, Thinks, Does and Feels quadrants.",
    ));

    // Phase 2: As-Is scenario map
    tasks.push(task(
        "asis_scenario_map_proposition_a",
        "ux_designer",
        &[REFINEMENT, EMPATHY],
        "Document the current steps the persona goes through when facing the \
         problem, with the pain point at each step.",
        "A step-by-step As-Is scenario map.",
    ));
    tasks.push(task(
        "asis_scenario_map_proposition_b",
        "researcher",
        &[REFINEMENT, EMPATHY],
        "Propose an alternative mapping of the current workflow from a different \
         angle than a purely chronological one.",
        "An alternative As-Is scenario map.",
    ));
    tasks.push(task(
        "asis_scenario_map_comparison",
        "data_analyst",
        &[
            "asis_scenario_map_proposition_a",
            "asis_scenario_map_proposition_b",
        ],
        "Compare the two As-Is scenario maps: coverage, accuracy and the pain \
         points each one reveals.",
        "A comparison with strengths and weaknesses of each map.",
    ));
    tasks.push(task(
        ASIS,
        "design_facilitator",
        &[
            "asis_scenario_map_proposition_a",
            "asis_scenario_map_proposition_b",
            "asis_scenario_map_comparison",
        ],
        "Synthesize the final As-Is scenario map.",
        "The final As-Is scenario map.",
    ));

    // Phase 3: To-Be scenario map, five perspectives
    let tobe_perspectives = [
        (
            "a",
            "creative_facilitator",
            "Envision the ideal future state for the persona.",
        ),
        (
            "b",
            "ux_designer",
            "Propose an alternative future state focusing on user experience.",
        ),
        (
            "c",
            "product_manager",
            "Propose an alternative future state focusing on what a first product \
             release can deliver.",
        ),
        (
            "d",
            "innovation_coach",
            "Propose an alternative future state that breaks with current habits.",
        ),
        (
            "e",
            "business_strategist",
            "Propose an alternative future state that is commercially sustainable.",
        ),
    ];
    let tobe_names: Vec<String> = tobe_perspectives
        .iter()
        .map(|(suffix, _, _)| format!("tobe_scenario_map_proposition_{}", suffix))
        .collect();
    for ((_, agent, description), name) in tobe_perspectives.iter().zip(&tobe_names) {
        tasks.push(task(
            name,
            agent,
            &[EMPATHY, ASIS],
            description,
            "A To-Be scenario map, step by step, showing how each As-Is pain point is resolved.",
        ));
    }
    let tobe_refs: Vec<&str> = tobe_names.iter().map(String::as_str).collect();
    tasks.push(task(
        "tobe_scenario_map_comparison",
        "data_analyst",
        &tobe_refs,
        "Compare the five To-Be scenario maps.",
        "A ranked comparison of the five maps with the reasoning for each rank.",
    ));
    let mut tobe_synthesis_deps = tobe_refs.clone();
    tobe_synthesis_deps.push("tobe_scenario_map_comparison");
    tasks.push(task(
        TOBE,
        "design_facilitator",
        &tobe_synthesis_deps,
        "Synthesize the final To-Be scenario map.",
        "The final To-Be scenario map.",
    ));

    // Phase 4: Big Idea vignettes
    let vignettes = [
        (
            "a",
            "creative_facilitator",
            "Create a compelling solution narrative as a set of vignettes.",
        ),
        (
            "b",
            "innovation_coach",
            "Propose an alternative solution narrative.",
        ),
        (
            "c",
            "business_strategist",
            "Create a solution narrative from a skeptical perspective, exposing what \
             could fail.",
        ),
    ];
    let vignette_names: Vec<String> = vignettes
        .iter()
        .map(|(suffix, _, _)| format!("big_idea_vignettes_proposition_{}", suffix))
        .collect();
    for ((_, agent, description), name) in vignettes.iter().zip(&vignette_names) {
        tasks.push(task(
            name,
            agent,
            &[REFINEMENT, TOBE],
            description,
            "Three to five short vignettes describing the solution in use.",
        ));
    }
    let vignette_refs: Vec<&str> = vignette_names.iter().map(String::as_str).collect();
    tasks.push(task(
        "big_idea_vignettes_comparison",
        "product_manager",
        &vignette_refs,
        "Compare and evaluate the solution narratives.",
        "An evaluation of each narrative against desirability, feasibility and viability.",
    ));
    let mut vignette_synthesis_deps = vignette_refs.clone();
    vignette_synthesis_deps.push("big_idea_vignettes_comparison");
    tasks.push(task(
        BIG_IDEA,
        "design_facilitator",
        &vignette_synthesis_deps,
        "Synthesize the vignettes into one cohesive Big Idea narrative.",
        "The Big Idea narrative.",
    ));

    // Phase 5: Hills
    tasks.push(task(
        "writing_hills_proposition_a",
        "product_manager",
        &[REFINEMENT, BIG_IDEA],
        "Write Who-What-Wow Hills statements for the Big Idea.",
        "Two or three Hills statements.",
    ));
    tasks.push(task(
        "writing_hills_proposition_b",
        "creative_facilitator",
        &[REFINEMENT, BIG_IDEA],
        "Propose alternative Who-What-Wow Hills statements.",
        "Two or three Hills statements.",
    ));
    tasks.push(task(
        "writing_hills_comparison",
        "business_strategist",
        &["writing_hills_proposition_a", "writing_hills_proposition_b"],
        "Compare and evaluate the Hills statements.",
        "An evaluation of each Hills statement.",
    ));
    tasks.push(task(
        HILLS,
        "design_facilitator",
        &[
            "writing_hills_proposition_a",
            "writing_hills_proposition_b",
            "writing_hills_comparison",
        ],
        "Synthesize the final Who-What-Wow narrative.",
        "The final Hills statements.",
    ));

    tasks.push(task(
        "final_solution_overview",
        "product_manager",
        &[REFINEMENT, EMPATHY, ASIS, TOBE, BIG_IDEA, HILLS],
        "Create a comprehensive overview of the final mobile app solution: who it is \
         for, the problem it solves, how it works and why it wins.",
        "A structured overview document in Markdown.",
    ));

    tasks
}
