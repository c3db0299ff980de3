//! Account ↔ action plan membership audit.

use super::{add_finding, into_lists, Findings, HealthArgs, HealthCache, IndexHealth, AccountActionPlanIHReply};
use crate::error::Result;
use crate::keys::{ACCOUNT_ACTION_PLANS_PREFIX, ACTION_PLAN_PREFIX};
use crate::types::ActionPlan;
use tracing::info;

impl IndexHealth<'_> {
    /// Cross-checks every account's plan list against the plans themselves.
    /// Uses the object cache for plans and the index cache for account lists.
    pub fn get_account_action_plans_index_health(&self, args: &HealthArgs) -> Result<AccountActionPlanIHReply> {
        let plans: HealthCache<ActionPlan> = HealthCache::new(&args.object_cache);
        let account_plans: HealthCache<Vec<String>> = HealthCache::new(&args.index_cache);
        let mut broken = Findings::new();
        let mut missing = Findings::new();

        for account in self.ids_for_prefix(ACCOUNT_ACTION_PLANS_PREFIX)? {
            let Some(plan_ids) = account_plans.get_or_load(&account, || self.store.get_account_action_plans(&account))?
            else {
                continue;
            };
            for plan_id in plan_ids.iter() {
                match plans.get_or_load(plan_id, || self.store.get_action_plan(plan_id))? {
                    None => {
                        broken.entry(plan_id.clone()).or_default();
                    }
                    Some(plan) if !plan.account_ids.contains(&account) => {
                        add_finding(&mut broken, plan_id.clone(), account.as_str());
                    }
                    Some(_) => {}
                }
            }
        }

        for plan_id in self.ids_for_prefix(ACTION_PLAN_PREFIX)? {
            let Some(plan) = plans.get_or_load(&plan_id, || self.store.get_action_plan(&plan_id))? else {
                continue;
            };
            for account in &plan.account_ids {
                let listed = account_plans
                    .get_or_load(account, || self.store.get_account_action_plans(account))?
                    .is_some_and(|ids| ids.contains(&plan_id));
                if !listed {
                    add_finding(&mut missing, account.clone(), plan_id.as_str());
                }
            }
        }

        info!(
            missing = missing.len(),
            broken = broken.len(),
            "account action plan index health checked"
        );
        Ok(AccountActionPlanIHReply {
            missing_account_action_plans: into_lists(missing),
            broken_references: into_lists(broken),
        })
    }
}
