//! Side-by-side placement of overlapping worklogs within a day.

use chrono::Local;

use crate::api::Worklog;

/// Assign `column` / `columns` so overlapping worklogs on the same local day
/// sit next to each other. Every worklog in a cluster of transitively
/// overlapping spans gets the cluster's column count.
pub fn assign_columns(worklogs: &mut [Worklog]) {
    let mut order: Vec<usize> = (0..worklogs.len()).collect();
    order.sort_by_key(|&i| {
        let w = &worklogs[i];
        (w.started.timestamp(), std::cmp::Reverse(w.time_spent_seconds))
    });

    let mut cluster: Vec<usize> = Vec::new();
    let mut column_ends: Vec<i64> = Vec::new();
    let mut cluster_end = i64::MIN;
    let mut cluster_day = None;

    for index in order {
        let start = worklogs[index].started.timestamp();
        let end = start.saturating_add(worklogs[index].time_spent_seconds.max(0));
        let day = worklogs[index].started.with_timezone(&Local).date_naive();

        if start >= cluster_end || cluster_day != Some(day) {
            close_cluster(worklogs, &cluster, column_ends.len());
            cluster.clear();
            column_ends.clear();
            cluster_end = i64::MIN;
            cluster_day = Some(day);
        }

        let column = match column_ends.iter().position(|&column_end| column_end <= start) {
            Some(free) => {
                column_ends[free] = end;
                free
            }
            None => {
                column_ends.push(end);
                column_ends.len() - 1
            }
        };

        worklogs[index].column = column;
        cluster.push(index);
        cluster_end = cluster_end.max(end);
    }

    close_cluster(worklogs, &cluster, column_ends.len());
}

fn close_cluster(worklogs: &mut [Worklog], cluster: &[usize], columns: usize) {
    for &index in cluster {
        worklogs[index].columns = columns.max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Issue;
    use chrono::TimeZone;

    fn worklog(id: &str, h: u32, m: u32, minutes: i64) -> Worklog {
        let started = Local
            .with_ymd_and_hms(2024, 7, 10, h, m, 0)
            .single()
            .expect("unambiguous local time")
            .fixed_offset();
        Worklog {
            id: id.into(),
            started,
            time_spent_seconds: minutes * 60,
            issue: Issue::default(),
            column: 9,
            columns: 9,
        }
    }

    fn placement(worklogs: &[Worklog]) -> Vec<(&str, usize, usize)> {
        worklogs.iter().map(|w| (w.id.as_str(), w.column, w.columns)).collect()
    }

    #[test]
    fn separate_worklogs_get_full_width() {
        let mut worklogs = vec![worklog("a", 9, 0, 60), worklog("b", 10, 0, 30)];
        assign_columns(&mut worklogs);
        assert_eq!(placement(&worklogs), vec![("a", 0, 1), ("b", 0, 1)]);
    }

    #[test]
    fn overlapping_worklogs_share_the_day() {
        let mut worklogs = vec![
            worklog("c", 10, 30, 60),
            worklog("a", 9, 0, 120),
            worklog("b", 9, 30, 30),
            worklog("d", 13, 0, 15),
        ];
        assign_columns(&mut worklogs);
        assert_eq!(
            placement(&worklogs),
            vec![("c", 1, 2), ("a", 0, 2), ("b", 1, 2), ("d", 0, 1)]
        );
    }

    #[test]
    fn empty_input_is_fine() {
        let mut worklogs: Vec<Worklog> = Vec::new();
        assign_columns(&mut worklogs);
        assert!(worklogs.is_empty());
    }
}
