pub mod quota_day;
