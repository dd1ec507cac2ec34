use crate::expr::Expr;
use crate::logical_plan::LogicalPlan;

/// Render logical plan as human-readable multiline text.
pub fn explain_logical(plan: &LogicalPlan) -> String {
    let mut s = String::new();
    fmt_plan(plan, 0, &mut s);
    s
}

fn fmt_plan(plan: &LogicalPlan, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    match plan {
        LogicalPlan::Scan { source, projection } => {
            let stats = source.stats();
            let dim = |v: Option<usize>| v.map_or_else(|| "?".to_string(), |n| n.to_string());
            out.push_str(&format!(
                "{pad}Scan {} [{} rows x {} cols]",
                source.name(),
                dim(stats.estimated_rows),
                dim(stats.estimated_columns)
            ));
            if let Some(p) = projection {
                out.push_str(&format!(" projection={}", fmt_list(p)));
            }
            out.push('\n');
        }
        LogicalPlan::Projection { exprs, input } => {
            out.push_str(&format!("{pad}Projection {}\n", fmt_exprs(exprs)));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Filter { predicate, input } => {
            out.push_str(&format!("{pad}Filter {predicate}\n"));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::WithColumn { expr, input } => {
            out.push_str(&format!("{pad}WithColumn {} := {expr}\n", expr.output_name()));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::GroupBy { keys, aggs, input } => {
            out.push_str(&format!(
                "{pad}GroupBy keys={} aggs={}\n",
                fmt_exprs(keys),
                fmt_exprs(aggs)
            ));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Join {
            left,
            right,
            join_type,
            left_on,
            right_on,
            suffix,
        } => {
            out.push_str(&format!(
                "{pad}Join type={} left_on={} right_on={} suffix={suffix}\n",
                join_type.name(),
                fmt_list(left_on),
                fmt_list(right_on)
            ));
            out.push_str(&format!("{pad}  left:\n"));
            fmt_plan(left, indent + 2, out);
            out.push_str(&format!("{pad}  right:\n"));
            fmt_plan(right, indent + 2, out);
        }
        LogicalPlan::Sort {
            by,
            descending,
            input,
        } => {
            let keys: Vec<String> = by
                .iter()
                .zip(descending.iter())
                .map(|(c, d)| if *d { format!("{c} desc") } else { c.clone() })
                .collect();
            out.push_str(&format!("{pad}Sort by={}\n", fmt_list(&keys)));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Limit { n, input } => {
            out.push_str(&format!("{pad}Limit n={n}\n"));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Tail { n, input } => {
            out.push_str(&format!("{pad}Tail n={n}\n"));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Distinct { subset, input } => {
            match subset {
                Some(s) => out.push_str(&format!("{pad}Distinct subset={}\n", fmt_list(s))),
                None => out.push_str(&format!("{pad}Distinct\n")),
            }
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Pivot {
            index,
            columns,
            values,
            agg,
            input,
        } => {
            out.push_str(&format!(
                "{pad}Pivot index={} columns={columns} values={values} agg={}\n",
                fmt_list(index),
                agg.name()
            ));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Melt {
            id_vars,
            value_vars,
            variable_name,
            value_name,
            input,
        } => {
            let vars = if value_vars.is_empty() {
                "*".to_string()
            } else {
                fmt_list(value_vars)
            };
            out.push_str(&format!(
                "{pad}Melt id_vars={} value_vars={vars} -> ({variable_name}, {value_name})\n",
                fmt_list(id_vars)
            ));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Cache { id, input } => {
            out.push_str(&format!("{pad}Cache id={id}\n"));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Apply {
            column,
            func,
            input,
        } => {
            out.push_str(&format!("{pad}Apply {}({column})\n", func.name));
            fmt_plan(input, indent + 1, out);
        }
    }
}

fn fmt_list(items: &[String]) -> String {
    format!("[{}]", items.join(", "))
}

fn fmt_exprs(exprs: &[Expr]) -> String {
    let parts: Vec<String> = exprs.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(", "))
}
