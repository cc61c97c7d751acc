//! Plan assembly.
//!
//! Drives one pass over the rule rows: resolve the objects each row
//! selects, build candidate groups, segment updates, and tag ops, and
//! fold every candidate into the running plan.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::inventory::Inventory;
use crate::nsx::{Segment, Tag, VirtualMachine};
use crate::rules::{ObjectType, RuleRow, RuleSet, ScopeColumn};

use super::expression::{Expression, ExpressionBuilder, MemberType};
use super::matching::{match_by_ip, match_by_name, IpSpec};
use super::merge::DedupMerger;
use super::plan::{GroupSpec, Plan, SegmentUpdate};
use super::tag_ops::TagOpPlanner;
use super::topology::TopologyResolver;

/// Assembles a plan from a rules table and an inventory snapshot.
#[derive(Debug)]
pub struct PlanAssembler<'a> {
    inventory: &'a Inventory,
    topology: TopologyResolver<'a>,
    builder: ExpressionBuilder,
    merger: DedupMerger,
    tag_planner: TagOpPlanner,
}

impl<'a> PlanAssembler<'a> {
    /// Creates an assembler over the snapshot.
    #[must_use]
    pub const fn new(inventory: &'a Inventory) -> Self {
        Self {
            inventory,
            topology: TopologyResolver::new(inventory),
            builder: ExpressionBuilder::new(),
            merger: DedupMerger::new(),
            tag_planner: TagOpPlanner::new(),
        }
    }

    /// Runs every rule row against the snapshot and returns the plan.
    ///
    /// # Errors
    ///
    /// Returns an error on a malformed IP specifier, an over-long
    /// expression, or an uncomparable expression pair during dedup.
    pub fn assemble(&self, rules: &RuleSet) -> Result<Plan> {
        let mut plan = Plan::new(&rules.scopes);

        for rule in &rules.rows {
            self.plan_row(&mut plan, rule, &rules.scopes)?;
        }

        info!("Planned {plan}");
        Ok(plan)
    }

    /// Plans one rule row into the running plan.
    fn plan_row(&self, plan: &mut Plan, rule: &RuleRow, scopes: &[ScopeColumn]) -> Result<()> {
        let tags = rule.tags(scopes);
        debug!(
            "Row {}: {} '{}' with {} tags",
            rule.line,
            rule.object_type,
            rule.name,
            tags.len()
        );

        match rule.object_type {
            ObjectType::Ip if !rule.resolve => self.plan_ip_group(plan, rule),
            ObjectType::Ip => {
                let specs = IpSpec::parse_list(&rule.name)?;
                let vms = match_by_ip(&self.inventory.virtual_machines, &specs);
                self.plan_vm_rule(plan, rule, &tags, &vms)
            }
            ObjectType::Vm => {
                let vms =
                    match_by_name(&self.inventory.virtual_machines, &rule.name, rule.operator);
                self.plan_vm_rule(plan, rule, &tags, &vms)
            }
            ObjectType::Segment | ObjectType::Tier0 | ObjectType::Tier1 => {
                let Some(segments) = self.topology.resolve_segments(rule) else {
                    return Ok(());
                };
                if segments.is_empty() {
                    warn!("No segments match '{}', skipping row {}", rule.name, rule.line);
                    return Ok(());
                }

                if rule.resolve {
                    let vms = self.topology.find_attached_vms(&segments);
                    self.plan_vm_rule(plan, rule, &tags, &vms)
                } else {
                    self.plan_segment_rule(plan, rule, &tags, &segments)
                }
            }
        }
    }

    /// Plans a literal address group from an `ip` row.
    fn plan_ip_group(&self, plan: &mut Plan, rule: &RuleRow) -> Result<()> {
        let specs = IpSpec::parse_list(&rule.name)?;
        let group = GroupSpec::new(
            Self::explicit_name(rule, "SG_IPSET"),
            vec![Expression::IpAddressExpression {
                ip_addresses: specs.iter().map(ToString::to_string).collect(),
            }],
        );
        self.merger.merge_group(&mut plan.groups, group)
    }

    /// Plans groups and tag ops for a resolved VM list.
    fn plan_vm_rule(
        &self,
        plan: &mut Plan,
        rule: &RuleRow,
        tags: &[Tag],
        vms: &[&VirtualMachine],
    ) -> Result<()> {
        if vms.is_empty() {
            warn!("No VMs match '{}', skipping row {}", rule.name, rule.line);
            return Ok(());
        }
        info!("Row {}: {} VMs match '{}'", rule.line, vms.len(), rule.name);

        if tags.is_empty() {
            let group = GroupSpec::new(
                Self::explicit_name(rule, "SG_VM"),
                vec![Expression::ExternalIdExpression {
                    member_type: MemberType::VirtualMachine,
                    external_ids: vms.iter().map(|vm| vm.external_id.clone()).collect(),
                }],
            );
            return self.merger.merge_group(&mut plan.groups, group);
        }

        let base = Self::progressive_base(rule, "SG");
        for (name, expression) in
            self.builder
                .build_progressive(tags, MemberType::VirtualMachine, &base)?
        {
            self.merger
                .merge_group(&mut plan.groups, GroupSpec::new(name, expression))?;
        }

        self.tag_planner.plan_vm_tags(&mut plan.scopes, vms, tags);
        Ok(())
    }

    /// Plans groups and tag updates for resolved segments.
    fn plan_segment_rule(
        &self,
        plan: &mut Plan,
        rule: &RuleRow,
        tags: &[Tag],
        segments: &[&Segment],
    ) -> Result<()> {
        info!(
            "Row {}: {} segments match '{}'",
            rule.line,
            segments.len(),
            rule.name
        );

        if tags.is_empty() {
            let group = GroupSpec::new(
                Self::explicit_name(rule, "SG_Segment"),
                vec![Expression::PathExpression {
                    paths: segments.iter().map(|s| s.path.clone()).collect(),
                }],
            );
            return self.merger.merge_group(&mut plan.groups, group);
        }

        let base = Self::progressive_base(rule, "SG_Segment");
        for (name, expression) in
            self.builder
                .build_progressive(tags, MemberType::Segment, &base)?
        {
            self.merger
                .merge_group(&mut plan.groups, GroupSpec::new(name, expression))?;
        }

        for segment in segments {
            self.merger
                .merge_segment_update(&mut plan.segments, SegmentUpdate::new(segment, tags));
        }
        Ok(())
    }

    /// Name for a one-off group: the row's override or a fresh id.
    fn explicit_name(rule: &RuleRow, prefix: &str) -> String {
        match &rule.group_name {
            Some(name) => format!("{prefix}_{name}"),
            None => format!("{prefix}_{}", Uuid::new_v4()),
        }
    }

    /// Base name for progressive tag groups; tag values are appended
    /// per prefix, so no fallback id is needed.
    fn progressive_base(rule: &RuleRow, prefix: &str) -> String {
        match &rule.group_name {
            Some(name) => format!("{prefix}_{name}"),
            None => prefix.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nsx::{IpAddressInfo, PortAttachment, SegmentPort, Vif};
    use crate::rules::MatchOperator;

    fn vm(external_id: &str, name: &str, ips: &[&str]) -> VirtualMachine {
        VirtualMachine {
            external_id: external_id.to_string(),
            display_name: name.to_string(),
            tags: Vec::new(),
            attachments: vec![Vif {
                owner_vm_id: external_id.to_string(),
                external_id: format!("vif-{external_id}"),
                lport_attachment_id: Some(format!("att-{external_id}")),
                ip_address_info: vec![IpAddressInfo {
                    ip_addresses: ips.iter().map(|ip| ip.parse().unwrap()).collect(),
                }],
            }],
        }
    }

    fn segment(path: &str, name: &str, connectivity: Option<&str>) -> Segment {
        serde_json::from_value(serde_json::json!({
            "path": path,
            "display_name": name,
            "connectivity_path": connectivity,
        }))
        .unwrap()
    }

    fn row(
        object_type: ObjectType,
        name: &str,
        operator: MatchOperator,
        resolve: bool,
        tag_values: &[Option<&str>],
    ) -> RuleRow {
        RuleRow {
            object_type,
            name: name.to_string(),
            operator,
            resolve,
            group_name: None,
            tag_values: tag_values
                .iter()
                .map(|value| value.map(ToString::to_string))
                .collect(),
            line: 1,
        }
    }

    fn rule_set(scopes: &[(&str, bool)], rows: Vec<RuleRow>) -> RuleSet {
        RuleSet {
            scopes: scopes
                .iter()
                .map(|(name, multitag)| ScopeColumn {
                    name: (*name).to_string(),
                    multitag: *multitag,
                })
                .collect(),
            rows,
        }
    }

    fn web_inventory() -> Inventory {
        Inventory {
            virtual_machines: vec![
                vm("vm-1", "web-01", &["10.0.0.5"]),
                vm("vm-2", "web-02", &["10.0.1.7"]),
                vm("vm-3", "db-01", &["192.168.1.20"]),
            ],
            ..Inventory::default()
        }
    }

    #[test]
    fn test_startswith_rule_plans_one_tag_group() {
        let inventory = web_inventory();
        let assembler = PlanAssembler::new(&inventory);
        let rules = rule_set(
            &[("Env", false)],
            vec![row(
                ObjectType::Vm,
                "web",
                MatchOperator::StartsWith,
                false,
                &[Some("prod")],
            )],
        );

        let plan = assembler.assemble(&rules).unwrap();

        assert_eq!(plan.groups.len(), 1);
        assert_eq!(plan.groups[0].display_name(), "SG_prod");
        assert_eq!(
            plan.groups[0].payload.expression,
            vec![Expression::tag_condition(
                &Tag::new("Env", "prod"),
                MemberType::VirtualMachine
            )]
        );
        assert_eq!(plan.scopes[0].tags.len(), 1);
        assert_eq!(plan.scopes[0].tags[0].resource_ids(), ["vm-1", "vm-2"]);
    }

    #[test]
    fn test_two_tags_build_progressive_groups() {
        let inventory = web_inventory();
        let assembler = PlanAssembler::new(&inventory);
        let rules = rule_set(
            &[("Env", false), ("App", true)],
            vec![row(
                ObjectType::Vm,
                "web-01",
                MatchOperator::Exact,
                false,
                &[Some("prod"), Some("web")],
            )],
        );

        let plan = assembler.assemble(&rules).unwrap();

        let names: Vec<&str> = plan.groups.iter().map(GroupSpec::display_name).collect();
        assert_eq!(names, ["SG_prod", "SG_prod_web"]);
        assert_eq!(plan.tag_op_count(), 2);
    }

    #[test]
    fn test_ip_rule_builds_address_group() {
        let inventory = web_inventory();
        let assembler = PlanAssembler::new(&inventory);
        let mut ip_row = row(
            ObjectType::Ip,
            "10.0.0.1-10.0.0.10, 192.168.1.0/24",
            MatchOperator::Exact,
            false,
            &[],
        );
        ip_row.group_name = Some("edge".to_string());
        let rules = rule_set(&[("Env", false)], vec![ip_row]);

        let plan = assembler.assemble(&rules).unwrap();

        assert_eq!(plan.groups.len(), 1);
        assert_eq!(plan.groups[0].display_name(), "SG_IPSET_edge");
        assert_eq!(
            plan.groups[0].payload.expression,
            vec![Expression::IpAddressExpression {
                ip_addresses: vec![
                    "10.0.0.1-10.0.0.10".to_string(),
                    "192.168.1.0/24".to_string()
                ],
            }]
        );
    }

    #[test]
    fn test_resolved_ip_rule_tags_matching_vms() {
        let inventory = web_inventory();
        let assembler = PlanAssembler::new(&inventory);
        let rules = rule_set(
            &[("Env", false)],
            vec![row(
                ObjectType::Ip,
                "10.0.0.1-10.0.0.10",
                MatchOperator::Exact,
                true,
                &[Some("prod")],
            )],
        );

        let plan = assembler.assemble(&rules).unwrap();

        assert_eq!(plan.scopes[0].tags.len(), 1);
        assert_eq!(plan.scopes[0].tags[0].resource_ids(), ["vm-1"]);
    }

    #[test]
    fn test_malformed_ip_rule_is_fatal() {
        let inventory = web_inventory();
        let assembler = PlanAssembler::new(&inventory);
        let rules = rule_set(
            &[],
            vec![row(
                ObjectType::Ip,
                "10.0.0.0/24-10.0.0.50",
                MatchOperator::Exact,
                false,
                &[],
            )],
        );

        assert!(assembler.assemble(&rules).is_err());
    }

    #[test]
    fn test_resolved_vm_rule_without_tags_builds_id_group() {
        let inventory = web_inventory();
        let assembler = PlanAssembler::new(&inventory);
        let mut vm_row = row(ObjectType::Vm, "db", MatchOperator::StartsWith, false, &[]);
        vm_row.group_name = Some("databases".to_string());
        let rules = rule_set(&[("Env", false)], vec![vm_row]);

        let plan = assembler.assemble(&rules).unwrap();

        assert_eq!(plan.groups.len(), 1);
        assert_eq!(plan.groups[0].display_name(), "SG_VM_databases");
        assert_eq!(
            plan.groups[0].payload.expression,
            vec![Expression::ExternalIdExpression {
                member_type: MemberType::VirtualMachine,
                external_ids: vec!["vm-3".to_string()],
            }]
        );
    }

    #[test]
    fn test_segment_rule_without_tags_builds_path_group() {
        let inventory = Inventory {
            segments: vec![
                segment("/infra/segments/app-a", "app-a", None),
                segment("/infra/segments/app-b", "app-b", None),
            ],
            ..Inventory::default()
        };
        let assembler = PlanAssembler::new(&inventory);
        let mut seg_row = row(
            ObjectType::Segment,
            "app",
            MatchOperator::StartsWith,
            false,
            &[],
        );
        seg_row.group_name = Some("apps".to_string());
        let rules = rule_set(&[], vec![seg_row]);

        let plan = assembler.assemble(&rules).unwrap();

        assert_eq!(plan.groups.len(), 1);
        assert_eq!(plan.groups[0].display_name(), "SG_Segment_apps");
        assert_eq!(
            plan.groups[0].payload.expression,
            vec![Expression::PathExpression {
                paths: vec![
                    "/infra/segments/app-a".to_string(),
                    "/infra/segments/app-b".to_string()
                ],
            }]
        );
    }

    #[test]
    fn test_segment_rule_with_tags_plans_updates() {
        let inventory = Inventory {
            segments: vec![
                segment("/infra/segments/app-a", "app-a", None),
                segment("/infra/segments/app-b", "app-b", None),
            ],
            ..Inventory::default()
        };
        let assembler = PlanAssembler::new(&inventory);
        let rules = rule_set(
            &[("Env", false)],
            vec![
                row(
                    ObjectType::Segment,
                    "app",
                    MatchOperator::StartsWith,
                    false,
                    &[Some("prod")],
                ),
                row(
                    ObjectType::Segment,
                    "app-a",
                    MatchOperator::Exact,
                    false,
                    &[Some("prod")],
                ),
            ],
        );

        let plan = assembler.assemble(&rules).unwrap();

        // Second row dedups into the first row's group and update.
        assert_eq!(plan.groups.len(), 1);
        assert_eq!(plan.groups[0].display_name(), "SG_Segment_prod");
        assert_eq!(plan.segments.len(), 2);
        assert_eq!(plan.segments[0].payload.tags, vec![Tag::new("Env", "prod")]);
    }

    #[test]
    fn test_resolved_tier1_rule_tags_attached_vms() {
        let mut inventory = web_inventory();
        inventory.segments = vec![
            segment("/infra/segments/app-a", "app-a", Some("/infra/tier-1s/edge")),
            segment("/infra/segments/app-b", "app-b", Some("/infra/tier-1s/edge")),
        ];
        inventory.tier1s = vec![crate::nsx::Gateway {
            path: "/infra/tier-1s/edge".to_string(),
            display_name: "edge".to_string(),
            resource_type: "Tier1".to_string(),
            tier0_path: None,
        }];
        inventory.segment_ports.insert(
            "/infra/segments/app-a".to_string(),
            vec![SegmentPort {
                display_name: "p1".to_string(),
                attachment: Some(PortAttachment {
                    id: "att-vm-1".to_string(),
                }),
            }],
        );
        inventory.segment_ports.insert(
            "/infra/segments/app-b".to_string(),
            vec![SegmentPort {
                display_name: "p2".to_string(),
                attachment: Some(PortAttachment {
                    id: "att-vm-2".to_string(),
                }),
            }],
        );
        let assembler = PlanAssembler::new(&inventory);
        let rules = rule_set(
            &[("Env", false)],
            vec![row(
                ObjectType::Tier1,
                "edge",
                MatchOperator::Exact,
                true,
                &[Some("prod")],
            )],
        );

        let plan = assembler.assemble(&rules).unwrap();

        assert!(plan.segments.is_empty());
        assert_eq!(plan.scopes[0].tags.len(), 1);
        let mut ids = plan.scopes[0].tags[0].resource_ids().to_vec();
        ids.sort();
        assert_eq!(ids, ["vm-1", "vm-2"]);
    }

    #[test]
    fn test_unmatched_rule_adds_nothing() {
        let inventory = web_inventory();
        let assembler = PlanAssembler::new(&inventory);
        let rules = rule_set(
            &[("Env", false)],
            vec![row(
                ObjectType::Vm,
                "mail",
                MatchOperator::StartsWith,
                false,
                &[Some("prod")],
            )],
        );

        let plan = assembler.assemble(&rules).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_generated_names_fall_back_to_fresh_ids() {
        let inventory = web_inventory();
        let assembler = PlanAssembler::new(&inventory);
        let rules = rule_set(
            &[],
            vec![
                row(ObjectType::Ip, "10.0.0.1", MatchOperator::Exact, false, &[]),
                row(ObjectType::Ip, "10.0.0.2", MatchOperator::Exact, false, &[]),
            ],
        );

        let plan = assembler.assemble(&rules).unwrap();

        assert_eq!(plan.groups.len(), 2);
        assert!(plan.groups[0].display_name().starts_with("SG_IPSET_"));
        assert_ne!(plan.groups[0].display_name(), plan.groups[1].display_name());
    }
}
